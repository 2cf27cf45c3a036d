// ABOUTME: The migrate command: initiate an externally controlled migration, then abort it
// ABOUTME: Waits for the coordinator, then forces ABORT and ABORTDONE in order

use std::time::Duration;
use tokio::time::Instant;

use crate::args::MigrateArgs;
use crate::error::MigrateError;
use crate::phase::MigrationPhase;
use crate::remote::{ApiError, ApiInfo, ControlPlane, MigrationCoordinator};
use crate::spec::build_migration_request;
use crate::store::ClientStore;

/// Phases forced on the coordinator, in order.
pub const FORCED_PHASES: [MigrationPhase; 2] = [MigrationPhase::Abort, MigrationPhase::AbortDone];

/// How long to give the coordinator to come up after initiating.
#[derive(Debug, Clone)]
pub struct ReadinessPolicy {
    /// Unconditional wait before connecting.
    pub settle_delay: Duration,
    /// Gap between status queries.
    pub poll_interval: Duration,
    /// Overall bound on status polling. Zero skips polling.
    pub timeout: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl ReadinessPolicy {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            timeout: Duration::ZERO,
        }
    }
}

/// Pick the source controller: the one named explicitly, else the store's current one.
pub fn resolve_source_controller<S: ClientStore + ?Sized>(
    store: &S,
    explicit: Option<&str>,
) -> Result<String, MigrateError> {
    match explicit {
        Some(name) => Ok(name.to_string()),
        None => store
            .current_controller()
            .map_err(MigrateError::SpecResolutionFailed),
    }
}

pub struct Migrator<'a, S: ?Sized, P> {
    store: &'a S,
    control_plane: &'a P,
    readiness: ReadinessPolicy,
}

impl<'a, S, P> Migrator<'a, S, P>
where
    S: ClientStore + ?Sized,
    P: ControlPlane,
{
    pub fn new(store: &'a S, control_plane: &'a P) -> Self {
        Self {
            store,
            control_plane,
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Run the whole sequence against `source_controller`. Returns the migration ID.
    ///
    /// Every step is fatal: nothing after a failed step is attempted.
    pub async fn run(
        &self,
        args: &MigrateArgs,
        source_controller: &str,
    ) -> Result<String, MigrateError> {
        let request = build_migration_request(
            self.store,
            source_controller,
            &args.model,
            &args.target_controller,
        )?;

        let source = self
            .store
            .controller_by_name(source_controller)
            .map_err(MigrateError::SpecResolutionFailed)?;
        let account = self
            .store
            .account_details(source_controller)
            .map_err(MigrateError::SpecResolutionFailed)?;
        let controller_info =
            ApiInfo::for_account(&source, &account).map_err(MigrateError::TokenDecodeFailed)?;
        let coordinator_info = ApiInfo::for_machine(&source, request.model_uuid(), &args.identity);

        let migration_id = self
            .control_plane
            .initiate_migration(&controller_info, &request)
            .await
            .map_err(MigrateError::InitiateFailed)?;
        tracing::info!("Migration started with ID {:?}", migration_id);

        if !self.readiness.settle_delay.is_zero() {
            tracing::debug!(
                "Waiting {:?} for the migration coordinator to start",
                self.readiness.settle_delay
            );
            tokio::time::sleep(self.readiness.settle_delay).await;
        }

        let coordinator = self
            .control_plane
            .connect_coordinator(&coordinator_info)
            .await
            .map_err(MigrateError::CoordinatorConnectFailed)?;

        wait_for_coordinator(&coordinator, &migration_id, &self.readiness).await?;

        for phase in FORCED_PHASES {
            tracing::info!("Set phase to {}", phase);
            coordinator
                .set_phase(phase)
                .await
                .map_err(|e| MigrateError::phase_rejected(phase, e))?;
        }

        Ok(migration_id)
    }
}

/// Poll the coordinator until it reports `migration_id`, bounded by `policy.timeout`.
async fn wait_for_coordinator<C: MigrationCoordinator>(
    coordinator: &C,
    migration_id: &str,
    policy: &ReadinessPolicy,
) -> Result<(), MigrateError> {
    if policy.timeout.is_zero() {
        return Ok(());
    }

    let started = Instant::now();
    let mut last_error: Option<ApiError> = None;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match coordinator.migration_status().await {
            Ok(status) if status.migration_id == migration_id => {
                if status.phase.is_terminal() {
                    tracing::warn!(
                        "Migration {} has already finished in phase {}",
                        status.migration_id,
                        status.phase
                    );
                }
                tracing::debug!(
                    "Coordinator ready after {} attempt(s): migration {} in phase {}",
                    attempt,
                    status.migration_id,
                    status.phase
                );
                return Ok(());
            }
            Ok(status) if status.phase.is_running() => {
                tracing::debug!(
                    "Coordinator still running migration {:?} ({}), waiting for {:?}",
                    status.migration_id,
                    status.phase,
                    migration_id
                );
                last_error = None;
            }
            Ok(status) => {
                tracing::debug!(
                    "Coordinator reports migration {:?} in phase {}, waiting for {:?}",
                    status.migration_id,
                    status.phase,
                    migration_id
                );
                last_error = None;
            }
            // The session was refused; waiting will not change that.
            Err(e) if e.is_unauthorized() => {
                return Err(MigrateError::CoordinatorConnectFailed(e));
            }
            Err(e) => {
                tracing::debug!("Coordinator status unavailable (attempt {}): {}", attempt, e);
                last_error = Some(e);
            }
        }

        if started.elapsed() >= policy.timeout {
            return Err(MigrateError::CoordinatorNotReady {
                migration_id: migration_id.to_string(),
                waited: started.elapsed(),
                last_error,
            });
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}
