//! Restore command - Replace a live directory with its backup

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use serde_json::json;
use std::path::PathBuf;

use super::utils;
use safe_restore::config::{self, ProfilesFile};
use safe_restore::restore::{
    LiveState, RestoreCoordinator, RestoreFailure, RestoreLock, RestoreOutcome, RestorePlan,
    RestoreRequest, RestoreSummary, SystemProcessChecker,
};

/// Exit code for a restore that was refused before any change
const EXIT_ABORTED: u8 = 1;

/// Options collected from the command line
#[derive(Debug, Default)]
pub struct RestoreOptions {
    pub live: Option<PathBuf>,
    pub backup: Option<PathBuf>,
    pub block_if_running: Option<String>,
    pub profile: Option<String>,
    pub config: Option<PathBuf>,
    pub keep_previous: bool,
    pub dry_run: bool,
    pub json: bool,
}

/// Execute the restore command, returning the process exit code
pub fn execute(options: &RestoreOptions) -> u8 {
    let request = match build_request(options) {
        Ok(r) => r,
        Err(e) => {
            report_abort(options.json, "configuration", &format!("{:#}", e));
            return EXIT_ABORTED;
        }
    };

    let coordinator = RestoreCoordinator::new(SystemProcessChecker);

    if options.dry_run {
        return match coordinator.plan(&request) {
            Ok(plan) => {
                print_plan(&plan, options.json);
                0
            }
            Err(reason) => {
                print_outcome(&RestoreOutcome::Aborted(reason), options.json);
                EXIT_ABORTED
            }
        };
    }

    // Two restores of the same live path must not interleave
    let _lock = match RestoreLock::acquire(&request.live_path) {
        Ok(lock) => lock,
        Err(e) => {
            report_abort(options.json, "lock_held", &e.to_string());
            return EXIT_ABORTED;
        }
    };

    if !options.json {
        println!("Restoring from backup:");
        println!("  Live path: {}", request.live_path.display());
        println!("  Backup path: {}", request.backup_path.display());
        if let Some(name) = &request.blocking_process {
            println!("  Blocking process: {}", name);
        }
        println!();
        utils::print_exists_status("Live resource", &request.live_path);
        utils::print_exists_status("Backup resource", &request.backup_path);
        println!();
    }

    let outcome = coordinator.restore(&request);
    print_outcome(&outcome, options.json);
    outcome.exit_code()
}

/// Turn CLI flags, or a profile plus overrides, into a request
fn build_request(options: &RestoreOptions) -> Result<RestoreRequest> {
    let mut request = match (&options.profile, &options.live, &options.backup) {
        (Some(name), _, _) => {
            let path = match &options.config {
                Some(p) => p.clone(),
                None => config::default_profiles_path()?,
            };
            let file = ProfilesFile::load(&path)?;
            file.profile(name, &path)
                .with_context(|| format!("Failed to select profile '{}'", name))?
                .to_request()
        }
        (None, Some(live), Some(backup)) => RestoreRequest::new(live, backup),
        _ => bail!("Either --profile or both --live and --backup must be provided"),
    };

    if let Some(name) = &options.block_if_running {
        request.blocking_process = Some(name.clone());
    }
    if options.keep_previous {
        request.keep_previous = true;
    }

    Ok(request)
}

fn report_abort(as_json: bool, reason: &str, message: &str) {
    if as_json {
        let value = json!({
            "outcome": "aborted",
            "reason": reason,
            "message": message,
        });
        println!("{}", value);
    } else {
        eprintln!("{} {}", "Aborted:".yellow(), message);
    }
}

fn print_outcome(outcome: &RestoreOutcome, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(outcome) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("{} failed to serialize outcome: {}", "Error:".red(), e),
        }
        return;
    }

    match outcome {
        RestoreOutcome::Success(summary) => print_success(summary),
        RestoreOutcome::Aborted(reason) => {
            eprintln!("{} {}", "Aborted:".yellow(), reason);
            eprintln!("No changes were made. It is safe to retry.");
        }
        RestoreOutcome::Failed(failure) => print_failure(failure),
    }
}

fn print_success(summary: &RestoreSummary) {
    println!(
        "{} {} file(s), {}",
        "Restored:".green(),
        summary.digest.files,
        utils::format_size(summary.digest.bytes)
    );
    println!("  -> {}", summary.live_path.display());
    if let Some(previous) = &summary.previous {
        println!("  Previous copy kept at: {}", previous.display());
    }
    println!();
    println!("{}", "Restore complete!".green());
}

fn print_failure(failure: &RestoreFailure) {
    eprintln!("{} {}", "Failed:".red(), failure);
    match &failure.live_state {
        LiveState::Untouched => {
            eprintln!("The live resource was not modified.");
        }
        LiveState::RolledBack => {
            eprintln!("The live resource was moved back to its original location.");
        }
        LiveState::Displaced { previous } => {
            eprintln!(
                "{} the original live resource could not be moved back and is at:",
                "WARNING:".red().bold()
            );
            eprintln!("  {}", previous.display());
        }
    }
    eprintln!("Do not retry automatically; inspect the paths above first.");
}

fn print_plan(plan: &RestorePlan, as_json: bool) {
    if as_json {
        let value = json!({ "outcome": "planned", "plan": plan });
        println!("{}", value);
        return;
    }

    println!("Would restore:");
    println!("  Live path: {}", plan.live_path.display());
    println!(
        "  Backup path: {} ({:?}, {})",
        plan.backup_path.display(),
        plan.backup_kind,
        utils::format_size(plan.backup_bytes)
    );
    if plan.creates_parent {
        println!("  Would create: {}", plan.staging_parent.display());
    }
    if plan.replaces_existing {
        println!("  Existing live resource would be replaced");
    } else {
        println!("  No live resource present; backup would be copied into place");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_request_from_flags() {
        let options = RestoreOptions {
            live: Some(PathBuf::from("/live")),
            backup: Some(PathBuf::from("/backup")),
            block_if_running: Some("app".to_string()),
            ..Default::default()
        };
        let request = build_request(&options).unwrap();
        assert_eq!(request.live_path, PathBuf::from("/live"));
        assert_eq!(request.blocking_process.as_deref(), Some("app"));
        assert!(!request.keep_previous);
    }

    #[test]
    fn test_request_from_profile_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("profiles.json");
        fs::write(
            &config_path,
            r#"{"profiles": {"app": {"live": "/a", "backup": "/b", "block_if_running": "old"}}}"#,
        )
        .unwrap();

        let options = RestoreOptions {
            profile: Some("app".to_string()),
            config: Some(config_path),
            block_if_running: Some("new".to_string()),
            keep_previous: true,
            ..Default::default()
        };
        let request = build_request(&options).unwrap();
        assert_eq!(request.backup_path, PathBuf::from("/b"));
        assert_eq!(request.blocking_process.as_deref(), Some("new"));
        assert!(request.keep_previous);
    }

    #[test]
    fn test_unknown_profile_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("profiles.json");
        fs::write(&config_path, r#"{"profiles": {}}"#).unwrap();

        let options = RestoreOptions {
            profile: Some("missing".to_string()),
            config: Some(config_path),
            ..Default::default()
        };
        assert!(build_request(&options).is_err());
        assert_eq!(execute(&options), EXIT_ABORTED);
    }

    #[test]
    fn test_missing_paths_rejected() {
        let options = RestoreOptions {
            live: Some(PathBuf::from("/live")),
            ..Default::default()
        };
        assert!(build_request(&options).is_err());
    }

    #[test]
    fn test_execute_restores_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup");
        let live = dir.path().join("live");
        fs::create_dir_all(&backup).unwrap();
        fs::write(backup.join("state.db"), "saved").unwrap();

        let options = RestoreOptions {
            live: Some(live.clone()),
            backup: Some(backup),
            json: true,
            ..Default::default()
        };
        assert_eq!(execute(&options), 0);
        assert_eq!(fs::read_to_string(live.join("state.db")).unwrap(), "saved");
    }

    #[test]
    fn test_execute_dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup");
        let live = dir.path().join("live");
        fs::create_dir_all(&backup).unwrap();

        let options = RestoreOptions {
            live: Some(live.clone()),
            backup: Some(backup),
            dry_run: true,
            json: true,
            ..Default::default()
        };
        assert_eq!(execute(&options), 0);
        assert!(!live.exists());
    }
}
