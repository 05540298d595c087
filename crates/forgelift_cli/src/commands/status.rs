//! The status command: look up a queued migration and print where it stands.

use forgelift::platform::JobState;

use crate::config::Config;

pub(crate) async fn handle_status(
    migration_id: &str,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::build_engine(config)?;
    let job = engine.get_migration_status(migration_id).await?;

    let state = match job.state {
        JobState::Pending => "queued",
        JobState::Running => "in progress",
        JobState::Succeeded => "succeeded",
        JobState::Failed => "failed",
    };
    println!("migration {}: {state}", job.id);

    if let (Some(remaining), Some(total)) = (job.remaining_repositories, job.total_repositories) {
        println!(
            "  repositories: {} of {total} done",
            total.saturating_sub(remaining)
        );
    }

    if job.state == JobState::Failed {
        let reason = job
            .failure_reason
            .unwrap_or_else(|| "no failure reason reported".to_string());
        return Err(reason.into());
    }

    Ok(())
}
