use std::time::Duration;

use super::shutdown::{Shutdown, Wait};
use super::timing::CycleTiming;
use crate::adapters::Gadget;
use crate::drain::{self, Drain};
use crate::error::{Result, RotatorError};
use crate::policy::{require, settle, Operation};
use crate::state::{DrainResult, ImageIndex, ImageStore, Journal};

/// What one half-cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub drained: DrainResult,
    pub timing: CycleTiming,
}

/// Result of [`RotationController::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Keep going with `next_live`, which is already exposed
    Continue {
        next_live: ImageIndex,
        report: CycleReport,
    },
    /// Shutdown was requested at a loop boundary
    Stopped,
}

/// Owns the steady-state rotation: one image live, the other drained.
///
/// The controller is the only writer of image roles and the only caller of
/// the gadget, so expose and withdraw never overlap.
pub struct RotationController<G, D> {
    gadget: G,
    /// Lent to the blocking pool while a drain runs
    drainer: Option<D>,
    store: ImageStore,
    record_window: Duration,
    shutdown: Shutdown,
    journal: Option<Journal>,
    /// What this controller last exposed
    exposed: Option<ImageIndex>,
}

impl<G: Gadget, D: Drain + Send + 'static> RotationController<G, D> {
    pub fn new(
        gadget: G,
        drainer: D,
        store: ImageStore,
        record_window: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            gadget,
            drainer: Some(drainer),
            store,
            record_window,
            shutdown,
            journal: None,
            exposed: None,
        }
    }

    /// Record every drain in `journal`
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Withdraw whatever is exposed, then expose `index`
    fn expose(&mut self, index: ImageIndex) -> Result<()> {
        require(Operation::Withdraw, self.gadget.withdraw())?;
        self.exposed = None;
        require(Operation::Expose, self.gadget.expose(self.store.image(index)))?;
        self.exposed = Some(index);
        self.store.mark_live(index);
        self.store.check()
    }

    /// Drain `index` off the async runtime
    async fn drain(&mut self, index: ImageIndex) -> Result<DrainResult> {
        let drainer = self.drainer.take().ok_or_else(|| {
            RotatorError::Invariant("drainer was lost by an earlier failed drain task".into())
        })?;
        let image = self.store.image(index).clone();
        let (drainer, result) = drain::drain_blocking(drainer, image).await?;
        self.drainer = Some(drainer);
        result
    }

    fn record(&self, result: &DrainResult) {
        if let Some(journal) = &self.journal {
            // Advisory only; a full disk must not stop the rotation
            let _ = settle(Operation::JournalWrite, journal.record(result));
        }
    }

    /// Run one half-cycle with `live` as the recording image.
    ///
    /// Returns the image that is live afterwards, so a single cycle can be
    /// driven and inspected in isolation.
    pub async fn step(&mut self, live: ImageIndex) -> Result<StepOutcome> {
        if self.shutdown.is_requested() {
            return Ok(StepOutcome::Stopped);
        }

        // Step 1: no-op when the previous step already exposed it
        if self.exposed != Some(live) {
            self.expose(live)?;
        }

        // Step 2: let the host record
        tracing::info!(image = %live, window_secs = self.record_window.as_secs(), "🎥 waiting for video files");
        if self.shutdown.sleep(self.record_window).await == Wait::Interrupted {
            return Ok(StepOutcome::Stopped);
        }

        // Steps 3-4: swap, keeping the gap without a live image short
        let next = live.other();
        self.expose(next)?;

        // Step 5: drain the image just withdrawn
        let drained = self.drain(live).await?;
        self.store.finish_drain(live)?;
        self.record(&drained);

        // Step 6: the drain overlapped the new window; wait out the rest
        let timing = CycleTiming::new(self.record_window, drained.elapsed);
        let residual = timing.residual_wait();
        tracing::info!(
            image = %live,
            drain_ms = drained.elapsed.as_millis() as u64,
            residual_ms = residual.as_millis() as u64,
            "took {} ms to move",
            drained.elapsed.as_millis()
        );
        if drained.elapsed > self.record_window {
            tracing::warn!(image = %next, "drain outlasted the record window");
        }
        if self.shutdown.sleep(residual).await == Wait::Interrupted {
            return Ok(StepOutcome::Stopped);
        }

        Ok(StepOutcome::Continue {
            next_live: next,
            report: CycleReport { drained, timing },
        })
    }

    /// Rotate until shutdown is requested or an operation fails
    pub async fn run(&mut self, first: ImageIndex) -> Result<()> {
        let mut live = first;
        loop {
            match self.step(live).await? {
                StepOutcome::Continue { next_live, report } => {
                    tracing::debug!(
                        drained = %report.drained.index,
                        verdict = report.drained.verdict.as_str(),
                        residual_ms = report.timing.residual_wait().as_millis() as u64,
                        "cycle complete"
                    );
                    live = next_live;
                }
                StepOutcome::Stopped => {
                    tracing::info!(live = ?self.store.live(), "rotation stopped");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::shutdown;
    use crate::state::data::Role;
    use crate::state::CopyVerdict;
    use crate::testutil::{Call, CallLog, FakeDrainer, FakeGadget};
    use std::path::Path;
    use tokio::time::Instant;

    const WINDOW: Duration = Duration::from_millis(900_000);

    fn controller(
        drains: Vec<Duration>,
        shutdown: Shutdown,
    ) -> (CallLog, RotationController<FakeGadget, FakeDrainer>) {
        let log = CallLog::default();
        let controller = RotationController::new(
            FakeGadget::new(log.clone()),
            FakeDrainer::new(log.clone(), drains),
            ImageStore::new(Path::new("/images")),
            WINDOW,
            shutdown,
        );
        (log, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_step_call_sequence() {
        let (log, mut controller) = controller(vec![Duration::from_millis(5_000)], Shutdown::never());

        let outcome = controller.step(ImageIndex::Zero).await.unwrap();

        let StepOutcome::Continue { next_live, report } = outcome else {
            panic!("expected the step to continue");
        };
        assert_eq!(next_live, ImageIndex::One);
        assert_eq!(report.drained.index, ImageIndex::Zero);
        assert_eq!(report.timing.residual_wait(), Duration::from_millis(895_000));
        assert_eq!(
            log.calls(),
            [
                Call::Withdraw,
                Call::Expose(ImageIndex::Zero),
                Call::Withdraw,
                Call::Expose(ImageIndex::One),
                Call::Drain(ImageIndex::Zero),
            ]
        );
        assert_eq!(controller.store.live(), Some(ImageIndex::One));
        assert_eq!(controller.store.role(ImageIndex::Zero), Role::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_step_does_not_re_expose() {
        let (log, mut controller) = controller(vec![], Shutdown::never());

        controller.step(ImageIndex::Zero).await.unwrap();
        controller.step(ImageIndex::One).await.unwrap();

        assert_eq!(
            log.calls(),
            [
                Call::Withdraw,
                Call::Expose(ImageIndex::Zero),
                Call::Withdraw,
                Call::Expose(ImageIndex::One),
                Call::Drain(ImageIndex::Zero),
                Call::Withdraw,
                Call::Expose(ImageIndex::Zero),
                Call::Drain(ImageIndex::One),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_expose_follows_a_withdraw() {
        let (log, mut controller) = controller(vec![], Shutdown::never());

        let mut live = ImageIndex::Zero;
        for _ in 0..5 {
            match controller.step(live).await.unwrap() {
                StepOutcome::Continue { next_live, .. } => live = next_live,
                StepOutcome::Stopped => unreachable!(),
            }
        }

        let calls = log.calls();
        for (i, call) in calls.iter().enumerate() {
            if matches!(call, Call::Expose(_)) {
                assert_eq!(calls[i - 1], Call::Withdraw, "expose at {} not preceded by withdraw", i);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_only_sees_draining_image() {
        let (_log, mut controller) = controller(vec![], Shutdown::never());

        let mut live = ImageIndex::Zero;
        for _ in 0..4 {
            if let StepOutcome::Continue { next_live, .. } = controller.step(live).await.unwrap() {
                assert_eq!(controller.store.live(), Some(next_live));
                live = next_live;
            }
        }

        let seen = &controller.drainer.as_ref().unwrap().roles_seen;
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|(_, role)| *role == Role::Draining));
        assert_eq!(
            seen.iter().map(|(index, _)| *index).collect::<Vec<_>>(),
            [ImageIndex::Zero, ImageIndex::One, ImageIndex::Zero, ImageIndex::One]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_runs_off_the_runtime_thread() {
        let (_log, mut controller) = controller(vec![], Shutdown::never());

        controller.step(ImageIndex::Zero).await.unwrap();
        controller.step(ImageIndex::One).await.unwrap();

        let threads = &controller.drainer.as_ref().unwrap().threads_seen;
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != std::thread::current().id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_duration_compensates_for_drain() {
        let (_log, mut controller) = controller(vec![Duration::from_millis(5_000)], Shutdown::never());

        let start = Instant::now();
        controller.step(ImageIndex::Zero).await.unwrap();

        // Window plus residual; the fake drain takes no virtual time
        assert_eq!(start.elapsed(), WINDOW + Duration::from_millis(895_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlong_drain_skips_residual_wait() {
        let (_log, mut controller) = controller(vec![Duration::from_millis(950_000)], Shutdown::never());

        let start = Instant::now();
        let outcome = controller.step(ImageIndex::Zero).await.unwrap();

        assert_eq!(start.elapsed(), WINDOW);
        let StepOutcome::Continue { report, .. } = outcome else {
            panic!("expected the step to continue");
        };
        assert_eq!(report.timing.residual_wait(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_step_does_nothing() {
        let (trigger, shutdown) = shutdown::channel();
        trigger.request();
        let (log, mut controller) = controller(vec![], shutdown);

        assert_eq!(controller.step(ImageIndex::Zero).await.unwrap(), StepOutcome::Stopped);
        assert!(log.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_window_skips_drain() {
        let (trigger, shutdown) = shutdown::channel();
        let (log, mut controller) = controller(vec![], shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.request();
        });

        controller.run(ImageIndex::Zero).await.unwrap();

        assert_eq!(log.calls(), [Call::Withdraw, Call::Expose(ImageIndex::Zero)]);
        assert_eq!(controller.store.live(), Some(ImageIndex::Zero));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_residual_wait_after_drain() {
        let (trigger, shutdown) = shutdown::channel();
        let (log, mut controller) = controller(vec![], shutdown);
        tokio::spawn(async move {
            // Inside the second half of the first cycle
            tokio::time::sleep(WINDOW + Duration::from_secs(60)).await;
            trigger.request();
        });

        controller.run(ImageIndex::Zero).await.unwrap();

        let calls = log.calls();
        assert_eq!(calls.last(), Some(&Call::Drain(ImageIndex::Zero)));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Drain(_))).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expose_failure_is_fatal() {
        let (_log, mut controller) = controller(vec![], Shutdown::never());
        controller.gadget.fail_expose = true;

        assert!(controller.step(ImageIndex::Zero).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_failure_is_fatal() {
        let (log, mut controller) = controller(vec![], Shutdown::never());
        controller.drainer.as_mut().unwrap().fail = true;

        assert!(controller.run(ImageIndex::Zero).await.is_err());
        // The other image was already live when the drain failed
        assert_eq!(controller.store.live(), Some(ImageIndex::One));
        assert_eq!(log.calls().last(), Some(&Call::Drain(ImageIndex::Zero)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_are_journaled() {
        let (_log, controller) = controller(
            vec![Duration::from_millis(1_200), Duration::from_millis(800)],
            Shutdown::never(),
        );
        let mut controller = controller.with_journal(Journal::open_in_memory().unwrap());

        controller.step(ImageIndex::Zero).await.unwrap();
        controller.step(ImageIndex::One).await.unwrap();

        let journal = controller.journal.as_ref().unwrap();
        assert_eq!(journal.drain_count().unwrap(), 2);
        let recent = journal.recent(1).unwrap();
        assert_eq!(recent[0].result.index, ImageIndex::One);
        assert_eq!(recent[0].result.verdict, CopyVerdict::Complete);
        assert_eq!(recent[0].result.elapsed, Duration::from_millis(800));
    }
}
