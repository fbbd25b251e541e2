use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// `#[zbus::proxy]` generates `AttendanceProxy` for the daemon's interface.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn process_frame(&self, image: Vec<u8>) -> zbus::Result<String>;
    async fn enroll(&self, roll_number: &str, images: Vec<Vec<u8>>) -> zbus::Result<bool>;
    async fn import_dataset(&self, dir: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn reload_gallery(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a roll number from several face images
    Enroll {
        /// Roll number to enroll (case-insensitive)
        roll_number: String,
        /// Face images of the person
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize one image and mark attendance
    Recognize {
        image: PathBuf,
    },
    /// Enroll every <roll_number>/ folder under a dataset directory
    Import {
        /// Dataset root, as seen by the daemon
        dir: PathBuf,
    },
    /// List enrolled roll numbers
    List,
    /// Reload the gallery from the signature store
    Reload,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;

    match cli.command {
        Commands::Enroll { roll_number, images } => {
            let mut payload = Vec::with_capacity(images.len());
            for path in &images {
                payload.push(std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?);
            }
            tracing::debug!(count = payload.len(), "sending enrollment images");
            if proxy.enroll(&roll_number, payload).await? {
                println!("Enrolled {roll_number} from {} image(s)", images.len());
            } else {
                bail!("enrollment of {roll_number} was rejected (see rollcalld logs)");
            }
        }
        Commands::Recognize { image } => {
            let bytes = std::fs::read(&image).with_context(|| format!("failed to read {}", image.display()))?;
            let reply = proxy.process_frame(bytes).await?;
            println!("{}", describe_outcome(&reply)?);
        }
        Commands::Import { dir } => {
            let dir = std::fs::canonicalize(&dir).unwrap_or(dir);
            let reply = proxy.import_dataset(&dir.to_string_lossy()).await?;
            let report: serde_json::Value = serde_json::from_str(&reply).context("malformed import report")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::List => {
            let identities: Vec<String> =
                serde_json::from_str(&proxy.list_identities().await?).context("malformed identity list")?;
            if identities.is_empty() {
                println!("No identities enrolled");
            }
            for identity in identities {
                println!("{identity}");
            }
        }
        Commands::Reload => {
            let count = proxy.reload_gallery().await?;
            println!("Gallery reloaded: {count} identities");
        }
        Commands::Status => {
            let status: serde_json::Value =
                serde_json::from_str(&proxy.status().await?).context("malformed status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Render a `ProcessFrame` reply as one human-readable line.
fn describe_outcome(reply: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(reply).context("malformed frame outcome")?;
    let status = value
        .get("status")
        .and_then(|s| s.as_str())
        .context("frame outcome has no status")?;
    Ok(match value.get("rollNumber").and_then(|r| r.as_str()) {
        Some(roll) => format!("{status}: {roll}"),
        None => status.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enroll_requires_images() {
        assert!(Cli::try_parse_from(["rollcall", "enroll", "21a1"]).is_err());

        let cli = Cli::try_parse_from(["rollcall", "enroll", "21a1", "a.jpg", "b.jpg"]).unwrap();
        match cli.command {
            Commands::Enroll { roll_number, images } => {
                assert_eq!(roll_number, "21a1");
                assert_eq!(images.len(), 2);
            }
            _ => panic!("expected enroll"),
        }
    }

    #[test]
    fn test_session_flag_is_global() {
        let cli = Cli::try_parse_from(["rollcall", "status", "--session"]).unwrap();
        assert!(cli.session);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_describe_outcome() {
        assert_eq!(
            describe_outcome(r#"{"status":"Attendance marked","rollNumber":"21a1"}"#).unwrap(),
            "Attendance marked: 21a1"
        );
        assert_eq!(describe_outcome(r#"{"status":"Unknown face"}"#).unwrap(), "Unknown face");
        assert!(describe_outcome("not json").is_err());
    }
}
