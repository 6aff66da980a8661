//! progressd: drives the progress engine from the command line against SQLite,
//! with Redis as the fast cache when configured.

mod config;
mod db;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use progress_core::model::{ChapterId, CourseId, ProgressReport, QuestionId, QuizAnswer, StudentId};
use serde::Serialize;
use services::collaborators::{
    AssignmentUnlocker, EventPublisher, HttpAssignmentUnlocker, LogAssignmentUnlocker,
    LogEventPublisher, RedisStreamPublisher,
};
use services::{Clock, Collaborators, InMemoryViewCache, ProgressEngine, ReportOutcome};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{CollaboratorsConfig, Config};

const DEFAULT_LOG_FILTER: &str = "progressd=info,services=info,storage=info";

#[derive(Parser)]
#[command(name = "progressd")]
#[command(about = "Learning progress tracking and achievement engine")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PROGRESS_CONFIG", default_value = "progressd.toml")]
    config: PathBuf,

    /// SQLite database URL (overrides config file)
    #[arg(long, env = "PROGRESS_DB_URL")]
    db: Option<String>,

    /// Redis URL for the fast cache (overrides config file)
    #[arg(long, env = "PROGRESS_REDIS_URL")]
    redis: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,
    /// Install the default badge catalog and demo course content
    Seed,
    /// Apply one playback heartbeat
    Report {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        chapter: ChapterId,
        #[arg(long)]
        course: Option<CourseId>,
        /// Playback position in seconds
        #[arg(long)]
        position: u32,
        /// Video length in seconds
        #[arg(long)]
        duration: Option<u32>,
        /// Explicit completion ratio in [0, 1]
        #[arg(long)]
        rate: Option<f64>,
        /// Client declares the chapter finished
        #[arg(long)]
        completed: bool,
    },
    /// Grade a quiz submission
    Quiz {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        chapter: ChapterId,
        #[arg(long)]
        course: Option<CourseId>,
        /// Answer as QUESTION_ID=TEXT, repeatable
        #[arg(long = "answer", value_parser = parse_answer)]
        answers: Vec<QuizAnswer>,
    },
    /// List the badge catalog with the student's progress
    Badges {
        #[arg(long)]
        student: StudentId,
    },
    /// Award every badge the student now qualifies for
    Award {
        #[arg(long)]
        student: StudentId,
    },
    /// Explain the unlock guard for one chapter
    Unlock {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        chapter: ChapterId,
    },
    /// Show the progress record of one chapter
    Progress {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        chapter: ChapterId,
    },
    /// Show where the student should resume a course
    Resume {
        #[arg(long)]
        student: StudentId,
        #[arg(long)]
        course: CourseId,
    },
}

fn parse_answer(raw: &str) -> Result<QuizAnswer, String> {
    let (id, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected QUESTION_ID=TEXT, got {raw:?}"))?;
    let id: QuestionId = id.parse().map_err(|e| format!("{e}"))?;
    Ok(QuizAnswer::new(id, text))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase", tag = "status")]
enum ReportView {
    Applied {
        snapshot: progress_core::model::ProgressRecord,
        flushed: bool,
        unlock_triggered: bool,
    },
    Rejected(services::CheatRejection),
}

impl From<ReportOutcome> for ReportView {
    fn from(outcome: ReportOutcome) -> Self {
        match outcome {
            ReportOutcome::Applied {
                snapshot,
                flushed,
                unlock_triggered,
            } => Self::Applied {
                snapshot,
                flushed,
                unlock_triggered,
            },
            ReportOutcome::Rejected(rejection) => Self::Rejected(rejection),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_collaborators(config: &CollaboratorsConfig) -> anyhow::Result<Collaborators> {
    let events: Arc<dyn EventPublisher> = match &config.event_stream_redis_url {
        Some(url) => Arc::new(
            RedisStreamPublisher::connect(url)
                .await
                .context("connecting to the event stream")?,
        ),
        None => Arc::new(LogEventPublisher),
    };
    let assignments: Arc<dyn AssignmentUnlocker> = match &config.homework_base_url {
        Some(base) => Arc::new(HttpAssignmentUnlocker::new(base.clone())),
        None => Arc::new(LogAssignmentUnlocker),
    };
    Ok(Collaborators {
        events,
        assignments,
        views: Arc::new(InMemoryViewCache::new()),
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(&cli.config)?;
    config.apply_overrides(cli.db, cli.redis);

    let db_url = db::normalize_sqlite_url(&config.database.url);
    db::prepare_sqlite_file(&db_url)?;

    let collaborators = build_collaborators(&config.collaborators).await?;
    let engine = ProgressEngine::new_sqlite(
        &db_url,
        config.cache.redis_url.as_deref(),
        Clock::default(),
        collaborators,
        &config.engine,
    )
    .await
    .context("starting the progress engine")?;

    match cli.command {
        Command::Migrate => {
            info!("schema is up to date");
        }
        Command::Seed => {
            let summary = seed::seed(engine.storage()).await?;
            print_json(&summary)?;
        }
        Command::Report {
            student,
            chapter,
            course,
            position,
            duration,
            rate,
            completed,
        } => {
            let mut report = ProgressReport::new(student, chapter, position);
            report.course_id = course;
            report.total_duration = duration;
            report.explicit_rate = rate;
            report.completed = completed;
            let outcome = engine.report_progress(&report).await?;
            print_json(&ReportView::from(outcome))?;
        }
        Command::Quiz {
            student,
            chapter,
            course,
            answers,
        } => {
            let submission = engine.submit_quiz(student, chapter, course, &answers).await?;
            print_json(&submission)?;
        }
        Command::Badges { student } => {
            print_json(&engine.get_badges(student).await?)?;
        }
        Command::Award { student } => {
            print_json(&engine.check_and_award_badges(student).await?)?;
        }
        Command::Unlock { student, chapter } => {
            print_json(&engine.check_unlock_condition(student, chapter).await?)?;
        }
        Command::Progress { student, chapter } => {
            print_json(&engine.get_progress(student, chapter).await?)?;
        }
        Command::Resume { student, course } => {
            print_json(&engine.last_study_position(student, course).await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
