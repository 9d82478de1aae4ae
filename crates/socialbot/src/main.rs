use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use socialbot_core::config::{self, BotConfig, YouTubeConfig};
use socialbot_core::instagram::{InstagramClient, InstagramClientConfig};
use socialbot_core::update::{DEFAULT_EDIT_SUMMARY, SocialSource, UpdateOptions, run_update};
use socialbot_core::youtube::YouTubeClient;

#[derive(Debug, Parser)]
#[command(
    name = "socialbot",
    version,
    about = "Splices fresh social-media content into wiki pages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Update the wiki page's socials section")]
    Update(UpdateArgs),
    #[command(about = "Fetch and print the most recent Instagram image post")]
    Instagram,
    #[command(about = "Fetch and print the channel's most recent video")]
    Youtube(YoutubeArgs),
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long, default_value = config::DEFAULT_PAGE_TITLE, value_name = "TITLE")]
    page: String,
    #[arg(
        long,
        default_value = "placeholder",
        value_name = "SOURCE",
        help = "Social data source: none|placeholder|instagram|youtube"
    )]
    source: String,
    #[arg(
        long,
        value_name = "TITLE",
        help = "CSS page whose .ig-card background image is rewritten"
    )]
    css_page: Option<String>,
    #[arg(
        long,
        default_value = DEFAULT_EDIT_SUMMARY,
        value_name = "TEXT",
        help = "Edit summary recorded in the page history"
    )]
    summary: String,
    #[arg(long, value_name = "PATH", help = "Snippet template file")]
    template: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct YoutubeArgs {
    #[arg(long, value_name = "ID", help = "Channel ID (defaults to YOUTUBE_CHANNEL)")]
    channel: Option<String>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Update(args) => run_update_command(args),
        Commands::Instagram => run_instagram_command(),
        Commands::Youtube(args) => run_youtube_command(args),
    }
}

fn run_update_command(args: UpdateArgs) -> Result<()> {
    let bot_config = BotConfig::from_env()?;
    let options = UpdateOptions {
        page_title: args.page,
        css_page: args.css_page,
        source: SocialSource::parse(&args.source)?,
        summary: args.summary,
        template_path: args.template.unwrap_or_else(config::template_path),
    };

    let report = run_update(&bot_config, &options)?;

    println!("page update");
    println!("page_title: {}", report.page_title);
    println!("edit_result: {}", report.edit_result);
    match &report.css {
        Some(css) => {
            println!("css.title: {}", css.title);
            println!("css.changed: {}", css.changed);
            println!(
                "css.edit_result: {}",
                css.edit_result.as_deref().unwrap_or("<skipped>")
            );
        }
        None => println!("css: <none>"),
    }
    println!("request_count: {}", report.request_count);
    Ok(())
}

fn run_instagram_command() -> Result<()> {
    let client =
        InstagramClient::new(InstagramClientConfig::new(config::instagram_config_path()))?;
    let post = client.last_post()?;
    println!("{}", serde_json::to_string_pretty(&post)?);
    Ok(())
}

fn run_youtube_command(args: YoutubeArgs) -> Result<()> {
    let client = YouTubeClient::new(YouTubeConfig::from_env()?)?;
    let video = client.last_video(args.channel.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&video)?);
    Ok(())
}
