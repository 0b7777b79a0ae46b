//! Operator CLI for the attendance service client.
//!
//! Covers both roles for smoke-testing a deployment: mint and render a
//! session QR as a teacher, run a check-in as a student with fixed
//! coordinates, and read back the history/roll endpoints.

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rollcall::checkin::{CheckInFlow, FixedLocationProvider};
use rollcall::{CheckInAttempt, ClientConfig, GeoPoint, LedgerClient, SessionIssuer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "QR attendance client tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Attendance service base URL (defaults to ROLLCALL_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mint a session token and render its QR code
    Issue {
        /// Course id
        #[arg(long)]
        course: i64,

        /// Schedule slot id
        #[arg(long)]
        schedule: i64,

        /// Issuing teacher id
        #[arg(long)]
        teacher: i64,

        /// Session date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Also write the QR as an SVG file
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Run a check-in against the service with fixed coordinates
    Checkin {
        /// Student id
        #[arg(long)]
        student: i64,

        /// Raw token text, or @path to read it from a file
        #[arg(long)]
        token: String,

        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lng: f64,
    },

    /// Print a student's own attendance history
    History {
        #[arg(long)]
        student: i64,
    },

    /// Print the attendance roll for one course
    Roll {
        #[arg(long)]
        course: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    let ledger = Arc::new(LedgerClient::new(config)?);

    match cli.command {
        Commands::Issue {
            course,
            schedule,
            teacher,
            date,
            out,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let issuer = SessionIssuer::new(ledger);
            let session = issuer.issue(course, schedule, teacher, date).await?;

            let claims = session.token().claims();
            println!(
                "{}: {} {}-{} ({})",
                claims.materia_nombre,
                claims.dia_semana,
                claims.hora_inicio,
                claims.hora_fin,
                claims.fecha
            );
            println!(
                "valid until {} (unix {})",
                format_instant(session.expires_at()),
                session.expires_at()
            );
            println!("{}", session.to_terminal_string()?);
            if let Some(path) = out {
                std::fs::write(&path, session.to_svg()?)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("wrote {}", path.display());
            }
            println!("token: {}", session.raw_text());
        }

        Commands::Checkin {
            student,
            token,
            lat,
            lng,
        } => {
            let raw = match token.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("reading token from {path}"))?
                    .trim()
                    .to_string(),
                None => token,
            };

            let locator = FixedLocationProvider(GeoPoint::new(lat, lng));
            let mut flow = CheckInFlow::new(ledger, locator, student);

            flow.on_scan(&raw).await;
            if let CheckInAttempt::Error { reason } = flow.attempt() {
                bail!("check-in failed: {reason}");
            }
            if let Some(token) = flow.attempt().token() {
                let claims = token.claims();
                println!(
                    "session: {}, {} {}-{} ({})",
                    claims.materia_nombre,
                    claims.dia_semana,
                    claims.hora_inicio,
                    claims.hora_fin,
                    claims.fecha
                );
            }

            flow.confirm().await;
            match flow.attempt() {
                CheckInAttempt::Success { outcome, .. } => {
                    println!(
                        "registered: {} (record {}, {:.1} m from class)",
                        outcome.message, outcome.asistencia.id, outcome.asistencia.distancia_metros
                    );
                }
                CheckInAttempt::Error { reason } => bail!("check-in failed: {reason}"),
                other => bail!("check-in stopped in state {}", other.state()),
            }
        }

        Commands::History { student } => {
            let entries = ledger.student_history(student).await?;
            if entries.is_empty() {
                println!("no attendance records");
            }
            for entry in entries {
                println!(
                    "{}  {}  {}",
                    entry.fecha, entry.hora_registro, entry.materia_nombre
                );
            }
        }

        Commands::Roll { course } => {
            let entries = ledger.course_attendance(course).await?;
            if entries.is_empty() {
                println!("no attendance records");
            }
            for entry in entries {
                println!(
                    "{}  {} {}  <{}>  {}",
                    entry.fecha, entry.nombre, entry.apellido, entry.email, entry.hora_registro
                );
            }
        }
    }

    Ok(())
}

fn format_instant(unix_seconds: i64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| unix_seconds.to_string())
}
