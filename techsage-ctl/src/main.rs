use std::{sync::Arc, time::Duration};

use anyhow::Context;
use techsage_sync::{
    api::{Author, BlogId, CommentId},
    ChannelEvent, CommentSection, CommentStore, RestClient, RetryPolicy, SyncConfig, WsConnector,
};

#[derive(structopt::StructOpt)]
struct Opt {
    /// API host, optionally prefixed with http:// or https://
    #[structopt(short, long, env = "TECHSAGE_HOST")]
    host: String,

    /// Use https and wss (also enabled by setting TECHSAGE_SECURE)
    #[structopt(long)]
    secure: bool,

    /// Username to act as
    #[structopt(short, long, env = "TECHSAGE_USER")]
    user: Option<String>,

    /// Seconds between live channel reconnection attempts
    #[structopt(long, env = "TECHSAGE_RETRY_SECS", default_value = "5")]
    retry_secs: u64,

    /// Give up on the live channel after this many failed attempts
    #[structopt(long, env = "TECHSAGE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Print the comments of a blog post
    List { blog: String },

    /// Follow the comments of a blog post live
    Watch { blog: String },

    /// Post a comment, or a reply with --parent
    Post {
        blog: String,
        text: String,

        #[structopt(long)]
        parent: Option<String>,
    },

    /// Like a comment, or unlike it if it already was liked
    Like { blog: String, comment: String },

    /// Delete a comment
    Delete { blog: String, comment: String },
}

fn print_store(store: &CommentStore) {
    let now = chrono::Utc::now();
    if store.is_empty() {
        println!("(no comments yet)");
    }
    for c in store.roots() {
        println!(
            "[{}] {} ({}, {} likes): {}",
            c.id,
            c.author.username,
            c.age_label(now),
            c.like_count,
            c.content
        );
        for r in c.replies.iter() {
            println!(
                "    [{}] {} ({}, {} likes): {}",
                r.id,
                r.author.username,
                r.age_label(now),
                r.like_count,
                r.content
            );
        }
    }
}

fn print_notices(section: &mut CommentSection) {
    for n in section.drain_notices() {
        eprintln!("notice: {n:?}");
    }
}

/// Gives the live channel a moment to come up, so actions can go through it
async fn wait_live(section: &mut CommentSection) {
    let res = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(event) = section.next_event().await {
            let connected = event == ChannelEvent::Connected;
            section.handle_event(event).await;
            if connected {
                return;
            }
        }
    })
    .await;
    if res.is_err() {
        tracing::warn!("live channel not available, falling back to rest");
    }
}

/// Waits for the server to relay an action sent over the live channel
async fn wait_echo(section: &mut CommentSection) {
    if !section.is_live() {
        return;
    }
    let res = tokio::time::timeout(Duration::from_secs(3), section.next_event()).await;
    match res {
        Ok(Some(event)) => section.handle_event(event).await,
        Ok(None) => tracing::warn!("live channel stopped before the server answered"),
        Err(_) => tracing::warn!("no answer from the server on the live channel"),
    }
}

/// Handles channel events until no submission is waiting for the server
async fn wait_confirmed(section: &mut CommentSection) {
    while let Some(deadline) = section.next_deadline() {
        tokio::select! {
            event = section.next_event() => match event {
                Some(event) => section.handle_event(event).await,
                None => {
                    tokio::time::sleep_until(deadline).await;
                    section.check_pending(tokio::time::Instant::now()).await;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                section.check_pending(tokio::time::Instant::now()).await;
            }
        }
    }
}

async fn watch(section: &mut CommentSection) -> anyhow::Result<()> {
    print_store(section.store());
    loop {
        let deadline = section.next_deadline();
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("listening for interruption")?;
                return Ok(());
            }
            event = section.next_event() => match event {
                Some(event) => {
                    section.handle_event(event).await;
                    println!();
                    print_store(section.store());
                }
                None => anyhow::bail!("live channel stopped"),
            },
            _ = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                section.check_pending(tokio::time::Instant::now()).await;
            }
        }
        print_notices(section);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = <Opt as structopt::StructOpt>::from_args();

    let mut config = SyncConfig::new(&opt.host);
    config.secure |= opt.secure || std::env::var_os("TECHSAGE_SECURE").is_some();
    config.retry = RetryPolicy {
        delay: Duration::from_secs(opt.retry_secs),
        max_attempts: opt.max_attempts,
    };
    let api = Arc::new(RestClient::new(&config));
    let user = opt.user.map(Author::named);
    let new_section = |blog: String| {
        CommentSection::new(
            config.clone(),
            BlogId(blog),
            user.clone(),
            api.clone(),
            Arc::new(WsConnector),
        )
    };

    match opt.cmd {
        Command::List { blog } => {
            let mut section = new_section(blog);
            section.load().await.context("fetching comments")?;
            print_store(section.store());
        }
        Command::Watch { blog } => {
            let mut section = new_section(blog);
            section.mount().await;
            print_notices(&mut section);
            watch(&mut section).await?;
        }
        Command::Post { blog, text, parent } => {
            let mut section = new_section(blog);
            section.mount().await;
            wait_live(&mut section).await;
            match parent {
                None => {
                    section.composer_mut().set_draft(text);
                    section.submit_comment().await;
                }
                Some(parent) => {
                    section.composer_mut().toggle_reply(CommentId(parent));
                    section.composer_mut().set_reply_draft(text);
                    section.submit_reply().await;
                }
            }
            wait_confirmed(&mut section).await;
            print_notices(&mut section);
            print_store(section.store());
        }
        Command::Like { blog, comment } => {
            let mut section = new_section(blog);
            section.mount().await;
            wait_live(&mut section).await;
            let id = CommentId(comment);
            section.toggle_like(&id).await;
            wait_echo(&mut section).await;
            print_notices(&mut section);
            if let Some(c) = section.store().get(&id) {
                println!("{} now has {} likes", c.id, c.like_count);
            }
        }
        Command::Delete { blog, comment } => {
            let mut section = new_section(blog);
            section.mount().await;
            wait_live(&mut section).await;
            section.delete(&CommentId(comment)).await;
            wait_echo(&mut section).await;
            print_notices(&mut section);
        }
    }

    Ok(())
}
