//! Doctor command - verify system requirements and configuration.

use crate::audio::FfmpegConverter;
use crate::cli::Output;
use crate::config::Settings;
use crate::recognition::CredentialSource;
use console::style;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Stemme Doctor");
    println!();
    println!("Checking system requirements and configuration...\n");

    let sections = [
        ("Converter", vec![check_ffmpeg(settings).await]),
        ("Recognition", vec![check_credentials(settings)]),
        ("Directories", vec![check_temp_dir(settings)]),
        ("Configuration", vec![check_config_file()]),
    ];

    let mut errors = 0;
    let mut warnings = 0;
    for (title, checks) in &sections {
        println!("{}", style(title).bold());
        for check in checks {
            check.print();
            match check.status {
                CheckStatus::Error => errors += 1,
                CheckStatus::Warning => warnings += 1,
                CheckStatus::Ok => {}
            }
        }
        println!();
    }

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before starting the server.",
            errors
        ));
    } else if warnings > 0 {
        Output::warning(&format!("{} warning(s). Stemme should work.", warnings));
    } else {
        Output::success("All checks passed!");
    }

    Ok(())
}

async fn check_ffmpeg(settings: &Settings) -> CheckResult {
    let converter = FfmpegConverter::new(&settings.converter);
    match converter.version().await {
        Ok(version) => CheckResult::ok("ffmpeg", &version),
        Err(e) => CheckResult::error("ffmpeg", &e.to_string(), install_hint_ffmpeg()),
    }
}

fn check_credentials(settings: &Settings) -> CheckResult {
    match CredentialSource::resolve(&settings.recognition) {
        Ok(CredentialSource::None) => CheckResult::warning(
            "Credentials",
            "No Google credentials configured",
            "Set GOOGLE_APPLICATION_CREDENTIALS or STEMME_GOOGLE_API_KEY, or run `gcloud auth application-default login`",
        ),
        Ok(source) => CheckResult::ok("Credentials", &source.describe()),
        Err(e) => CheckResult::error(
            "Credentials",
            &e.to_string(),
            "Check that the credentials file is a service_account or authorized_user JSON document",
        ),
    }
}

fn check_temp_dir(settings: &Settings) -> CheckResult {
    let dir = settings.temp_dir();
    let probe = dir.join(".stemme-doctor");

    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            CheckResult::ok("Temp directory", &dir.display().to_string())
        }
        Err(e) => CheckResult::error(
            "Temp directory",
            &format!("{} is not writable: {}", dir.display(), e),
            "Set general.temp_dir or STEMME_TEMP_DIR to a writable directory",
        ),
    }
}

fn check_config_file() -> CheckResult {
    let path = Settings::default_config_path();
    if path.exists() {
        CheckResult::ok("Config file", &path.display().to_string())
    } else {
        CheckResult::warning(
            "Config file",
            "Not found, using defaults",
            &format!("Create {} to customize settings", path.display()),
        )
    }
}

fn install_hint_ffmpeg() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "windows") {
        "Place ffmpeg.exe in the working directory or set FFMPEG_PATH"
    } else {
        "Install with: sudo apt install ffmpeg (or set FFMPEG_PATH)"
    }
}
