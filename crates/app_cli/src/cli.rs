use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use capture_client::{LocalPhotoDir, PhotoAnnotator};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use core_orchestrator::{SearchSession, build_context_pairs};
use core_types::{Note, NoteId};
use note_engine::{CONTEXT_WINDOW, format_duration, key_topics, merge_notes};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

use crate::services::{Services, build_provider};

#[derive(Parser)]
#[command(
    name = "pocket-notes",
    version,
    about = "Turn wearable captures into searchable, summarized notes"
)]
pub struct Cli {
    #[arg(long, env = "POCKET_NOTES_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "POCKET_NOTES_BACKEND_URL", global = true)]
    pub backend_url: Option<String>,

    #[arg(long, env = "POCKET_NOTES_USER_ID", global = true)]
    pub user_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "List generated and manual notes, newest first")]
    Notes(NotesArgs),

    #[command(about = "Poll the backend and print notes as they change")]
    Watch(WatchArgs),

    #[command(about = "Filter notes by text, or by photo description with `image:`")]
    Search(SearchArgs),

    #[command(about = "Summarize a generated note")]
    Summary(SummaryArgs),

    #[command(about = "Ask a question about a note")]
    Chat(ChatArgs),

    #[command(about = "Show a note's photos with descriptions and nearby narration")]
    Photos(NoteRef),

    #[command(about = "Create a manual note")]
    Add(AddArgs),

    #[command(about = "Edit a manual note")]
    Edit(EditArgs),

    #[command(about = "Delete a manual note")]
    Delete(NoteRef),

    #[command(about = "Describe photos in a directory that have no description yet")]
    Annotate(AnnotateArgs),
}

#[derive(Args)]
pub struct NotesArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args)]
pub struct WatchArgs {
    #[arg(long, help = "Summarize each generated note once")]
    pub summaries: bool,
}

#[derive(Args)]
pub struct SearchArgs {
    pub term: Option<String>,

    #[arg(long, help = "Read queries from stdin, one per line")]
    pub interactive: bool,
}

#[derive(Args)]
pub struct SummaryArgs {
    pub id: String,

    #[arg(long, help = "Discard the cached summary and ask again")]
    pub regenerate: bool,

    #[arg(long)]
    pub max_length: Option<usize>,
}

#[derive(Args)]
pub struct ChatArgs {
    pub id: String,
    pub question: String,
}

#[derive(Args)]
pub struct NoteRef {
    pub id: String,
}

#[derive(Args)]
pub struct AddArgs {
    pub title: String,
    #[arg(default_value = "")]
    pub content: String,
}

#[derive(Args)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args)]
pub struct AnnotateArgs {
    pub dir: PathBuf,
    #[arg(long, default_value = "/uploads")]
    pub url_prefix: String,
}

pub async fn run(services: &Services, command: Commands) -> Result<()> {
    match command {
        Commands::Notes(args) => notes(services, args).await,
        Commands::Watch(args) => watch_feed(services, args).await,
        Commands::Search(args) => search(services, args).await,
        Commands::Summary(args) => summary(services, args).await,
        Commands::Chat(args) => chat(services, args).await,
        Commands::Photos(args) => photos(services, args).await,
        Commands::Add(args) => {
            let note = services.notebook.add(&args.title, &args.content).await?;
            println!("{}", note.id);
            Ok(())
        }
        Commands::Edit(args) => edit(services, args).await,
        Commands::Delete(args) => {
            let id: NoteId = args.id.parse()?;
            if id.is_generated() {
                println!("Generated notes are read-only; edit the transcription instead.");
            } else if services.notebook.delete(id).await? {
                println!("Deleted {id}");
            } else {
                println!("No manual note with id {id}");
            }
            Ok(())
        }
        Commands::Annotate(args) => annotate(&services.config, &args).await,
    }
}

fn print_note_line(services: &Services, note: &Note) {
    let updated = services.synthesizer.format_time(note.updated_at());
    match note {
        Note::Generated(generated) => {
            let topics = key_topics(&generated.transcription_entries);
            println!(
                "{}  [{} | {} | {} photo(s)]  {}{}",
                note.id(),
                updated,
                format_duration(generated.duration_minutes),
                generated.photos.len(),
                generated.title,
                if topics.is_empty() {
                    String::new()
                } else {
                    format!("  #{}", topics.join(" #"))
                }
            );
        }
        Note::Manual(manual) => {
            println!("{}  [{} | manual]  {}", note.id(), updated, manual.title);
        }
    }
}

async fn notes(services: &Services, args: NotesArgs) -> Result<()> {
    let (snapshot, notes) = services.all_notes().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }
    if let Some(err) = &snapshot.last_error {
        println!("! backend unavailable, showing what could be loaded: {err}");
    }
    for note in &notes {
        print_note_line(services, note);
    }
    Ok(())
}

async fn watch_feed(services: &Services, args: WatchArgs) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut updates = services.feed.subscribe();
    let interval = services.config.backend.poll_interval();
    let max_length = services.config.summary.max_length;

    let printer = async {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if let Some(err) = &snapshot.last_error {
                println!("! {err}");
            }
            let notes = merge_notes(snapshot.notes.clone(), services.notebook.list().await);
            println!("--- {} note(s) ---", notes.len());
            for note in &notes {
                print_note_line(services, note);
                if args.summaries {
                    if let Note::Generated(generated) = note {
                        let summary = services
                            .summaries
                            .get_summary(note.id(), &generated.transcription_entries, &[], max_length)
                            .await;
                        println!("    {summary}");
                    }
                }
            }
        }
    };

    let stopper = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stopping watch");
        }
        stop_tx.send_replace(true);
    };

    tokio::select! {
        _ = services.feed.run_polling(interval, stop_rx) => {}
        _ = printer => {}
        _ = stopper => {}
    }
    Ok(())
}

async fn search(services: &Services, args: SearchArgs) -> Result<()> {
    let (_, notes) = services.all_notes().await;

    if !args.interactive {
        let term = args.term.unwrap_or_default();
        for note in services.search.search(&term, &notes).await {
            print_note_line(services, &note);
        }
        return Ok(());
    }

    let session = Arc::new(SearchSession::new(
        services.search.clone(),
        Duration::from_millis(services.config.search.debounce_ms),
    ));
    let notes = Arc::new(notes);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let session = session.clone();
        let notes = notes.clone();
        pending.push(tokio::spawn(async move {
            session.submit(&line, &notes).await.map(|found| (line, found))
        }));
    }
    for handle in pending {
        if let Ok(Some((term, found))) = handle.await {
            println!("> {term}: {} match(es)", found.len());
            for note in &found {
                print_note_line(services, note);
            }
        }
    }
    Ok(())
}

async fn summary(services: &Services, args: SummaryArgs) -> Result<()> {
    let (_, note) = services.find_note(&args.id).await?;
    let Note::Generated(generated) = &note else {
        bail!("summaries are only available for generated notes");
    };

    let pairs = build_context_pairs(
        &generated.photos,
        &generated.transcription_entries,
        services.backend.as_ref(),
        CONTEXT_WINDOW,
    )
    .await;
    let max_length = args.max_length.unwrap_or(services.config.summary.max_length);
    let entries = &generated.transcription_entries;
    let text = if args.regenerate {
        services
            .summaries
            .regenerate(note.id(), entries, &pairs, max_length)
            .await
    } else {
        services
            .summaries
            .get_summary(note.id(), entries, &pairs, max_length)
            .await
    };
    println!("{text}");
    Ok(())
}

async fn chat(services: &Services, args: ChatArgs) -> Result<()> {
    let (_, note) = services.find_note(&args.id).await?;
    let answer = services.chat.ask(&note, &args.question).await?;
    println!("{answer}");
    Ok(())
}

async fn photos(services: &Services, args: NoteRef) -> Result<()> {
    let (snapshot, note) = services.find_note(&args.id).await?;
    let pairs = build_context_pairs(
        note.photos(),
        &snapshot.entries,
        services.backend.as_ref(),
        CONTEXT_WINDOW,
    )
    .await;
    if pairs.is_empty() {
        println!("No photos for this note.");
    }
    for pair in pairs {
        let local = pair.timestamp.with_timezone(&Local);
        println!("{} ({})", pair.photo.filename, local.format("%Y-%m-%d %H:%M:%S"));
        println!("  {}", pair.context);
        for entry in &pair.related_transcriptions {
            println!(
                "  [{}] {}",
                services.synthesizer.format_time(entry.timestamp),
                entry.text
            );
        }
    }
    Ok(())
}

async fn edit(services: &Services, args: EditArgs) -> Result<()> {
    let id: NoteId = args.id.parse()?;
    let Some(existing) = services.notebook.get(id).await else {
        println!("No editable note with id {id}");
        return Ok(());
    };
    let title = args.title.unwrap_or(existing.title);
    let content = args.content.unwrap_or(existing.content);
    if let Some(note) = services.notebook.update(id, &title, &content).await? {
        println!("Updated {}", note.id);
    }
    Ok(())
}

pub async fn annotate(config: &AppConfig, args: &AnnotateArgs) -> Result<()> {
    let annotator = PhotoAnnotator::new(build_provider(config));
    let report = annotator
        .annotate_dir(&LocalPhotoDir::new(&args.dir, &args.url_prefix))
        .await?;
    println!(
        "described {}, already described {}, failed {}",
        report.described.len(),
        report.skipped,
        report.failed.len()
    );
    for name in &report.failed {
        println!("  failed: {name}");
    }
    Ok(())
}
