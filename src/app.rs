use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config;
use crate::data::{self, TopicService, V2exTopicService};
use crate::dispatch::{Dispatcher, FetchResponse};
use crate::media;
use crate::pagination::{Controller, FetchTicket, ListState, REPLIES_PER_PAGE};
use crate::settings::{Settings, SettingsHandle};
use crate::v2ex::{Node, TopicPage, TopicSummary};

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let display_path = friendly_path(config::default_path().as_ref());
    let settings = SettingsHandle::new(Settings::from(&cfg));

    if settings.snapshot().api_token.is_empty() {
        println!(
            "No API token configured. Set api.token in {display_path} or the V2TUI_API__TOKEN environment variable."
        );
    }

    let images = media::Manager::new(
        settings.clone(),
        media::Config {
            max_width: cfg.images.max_width,
            max_height: cfg.images.max_height,
            workers: cfg.images.workers,
            http_client: None,
        },
    );
    let service: Arc<dyn TopicService> = Arc::new(V2exTopicService::new(settings.clone()));
    let dispatcher = Dispatcher::new(service);
    let mut controller = Controller::new(Node::Hot);

    println!(
        "V2EX-TUI {} — nodes: hot tech creative play hot_topics all | <number> opens a topic | n/p page, b back, r refresh, token <value>, q quit",
        crate::VERSION
    );

    let ticket = controller.select_node(Node::Hot);
    run_fetch(&dispatcher, &mut controller, ticket, &images)?;

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();

        match input {
            "" => {}
            "q" | "quit" => break,
            "r" => {
                let ticket = controller.refresh();
                run_fetch(&dispatcher, &mut controller, ticket, &images)?;
            }
            "b" => match controller.back() {
                ListState::Topics(topics) => print_topics(topics),
                ListState::Empty => println!("Topic list is empty; r to refresh."),
            },
            "n" => match controller.next_page() {
                Some(ticket) => run_fetch(&dispatcher, &mut controller, ticket, &images)?,
                None => println!("Already at the last page."),
            },
            "p" => match controller.prev_page() {
                Some(ticket) => run_fetch(&dispatcher, &mut controller, ticket, &images)?,
                None => println!("Already at the first page."),
            },
            _ => {
                if let Some(token) = input.strip_prefix("token ") {
                    let token = token.trim();
                    match config::save_api_token(None, token) {
                        Ok(path) => {
                            settings.update(|current| current.api_token = token.to_string());
                            println!("Token saved to {}.", friendly_path(Some(&path)));
                        }
                        Err(err) => println!("Failed to save token: {err:#}"),
                    }
                } else if let Some(node) = data::node_from_key(input) {
                    let ticket = controller.select_node(node);
                    println!("Loading {}...", node.display_name());
                    run_fetch(&dispatcher, &mut controller, ticket, &images)?;
                } else if let Ok(number) = input.parse::<usize>() {
                    let topic_id = number
                        .checked_sub(1)
                        .and_then(|index| controller.topics().get(index))
                        .map(|topic| topic.id);
                    match topic_id {
                        Some(topic_id) => {
                            let ticket = controller.select_topic(topic_id);
                            run_fetch(&dispatcher, &mut controller, ticket, &images)?;
                        }
                        None => println!("No topic {number} in the current list."),
                    }
                } else {
                    println!("Unknown command: {input}");
                }
            }
        }
    }

    drop(images);
    Ok(())
}

/// Waits for the completion of `ticket`, letting the controller drop any
/// stale completion that may still be in the channel.
fn run_fetch(
    dispatcher: &Dispatcher,
    controller: &mut Controller,
    ticket: FetchTicket,
    images: &media::Manager,
) -> Result<()> {
    dispatcher.spawn(ticket);
    loop {
        let response = dispatcher
            .responses()
            .recv()
            .context("fetch worker disconnected")?;
        match response {
            FetchResponse::TopicList {
                generation, result, ..
            } => match result {
                Ok(topics) => {
                    if controller.apply_topic_list(generation, topics) {
                        print_topics(controller.topics());
                        return Ok(());
                    }
                }
                Err(err) => {
                    if generation == ticket.generation {
                        println!("Failed to load topics: {err}");
                        return Ok(());
                    }
                }
            },
            FetchResponse::TopicPage {
                generation,
                page,
                result,
                ..
            } => match result {
                Ok(topic_page) => {
                    if controller.apply_topic_page(generation, topic_page.detail.total_replies) {
                        print_page(&topic_page, page, controller.total_pages(), images);
                        return Ok(());
                    }
                }
                Err(err) => {
                    if generation == ticket.generation {
                        println!("Failed to load topic: {err}");
                        return Ok(());
                    }
                }
            },
        }
    }
}

fn print_topics(topics: &[TopicSummary]) {
    for (index, topic) in topics.iter().enumerate() {
        println!("{}. {} [{} replies]", index + 1, topic.title, topic.replies);
    }
}

fn print_page(page: &TopicPage, page_number: u32, total_pages: u32, images: &media::Manager) {
    println!("{}\n", page.detail.title);
    println!("{}\n", rewrite_images(&page.detail.body, images));
    println!("Node: {}", page.detail.node_title);
    println!("Author: {}", page.detail.author);
    println!("Replies: {}\n", page.detail.total_replies);
    println!("-------------------\n");

    if let Some(err) = &page.replies_error {
        println!("Failed to load replies: {err}");
        return;
    }

    println!("Page {page_number}/{total_pages}\n");
    for (index, reply) in page.replies.iter().enumerate() {
        let number = (i64::from(page_number) - 1) * REPLIES_PER_PAGE + index as i64 + 1;
        println!("#{number} {}:", reply.author);
        println!("{}\n", rewrite_images(&reply.body, images));
    }
}

/// Replaces embedded image URLs with inline data URIs where the cache can
/// supply them; unreachable or non-image URLs stay as they are.
fn rewrite_images(text: &str, images: &media::Manager) -> String {
    let urls = media::image_urls(text);
    if urls.is_empty() {
        return text.to_string();
    }
    let pending: Vec<_> = urls
        .into_iter()
        .map(|url| images.enqueue(url))
        .collect();
    let mut out = text.to_string();
    for rx in pending {
        if let Ok(resolved) = rx.recv() {
            if resolved.display != resolved.url {
                out = out.replace(&resolved.url, &resolved.display);
            }
        }
    }
    out
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/v2ex-tui/config.yaml".to_string()
    }
}
