/// One-time preconditions before the rotation starts
///
/// Every step is idempotent: it clears what a crashed previous run may have
/// left behind and creates what is missing, without touching valid images.

use std::path::Path;

use crate::adapters::{Gadget, LocalMount, Provisioner};
use crate::config::Config;
use crate::drain::{transfer, Drain};
use crate::error::{IoContext, Result};
use crate::policy::{require, settle, Operation};
use crate::state::{DrainResult, ImageIndex, ImageStore, Journal};

/// What the startup pass found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupReport {
    /// Slots whose backing image had to be created
    pub provisioned: Vec<ImageIndex>,
    /// Slots holding footage from a previous run, with entry counts
    pub leftovers: Vec<(ImageIndex, usize)>,
}

pub struct StartupSequencer<'a, G, M, P> {
    config: &'a Config,
    store: &'a ImageStore,
    gadget: &'a mut G,
    mount: &'a mut M,
    provisioner: &'a mut P,
}

fn ensure_dir(path: &Path) -> Result<()> {
    require(
        Operation::CreateDirectory,
        std::fs::create_dir_all(path).at_path(path),
    )
}

impl<'a, G: Gadget, M: LocalMount, P: Provisioner> StartupSequencer<'a, G, M, P> {
    pub fn new(
        config: &'a Config,
        store: &'a ImageStore,
        gadget: &'a mut G,
        mount: &'a mut M,
        provisioner: &'a mut P,
    ) -> Self {
        Self {
            config,
            store,
            gadget,
            mount,
            provisioner,
        }
    }

    /// Run every startup step. An `Err` means the rotation cannot start.
    pub fn initialize(&mut self) -> Result<StartupReport> {
        tracing::info!("🚗 starting dashcam rotator");
        let mut report = StartupReport::default();

        // Step 1: clear a gadget left exposed by a crashed run
        settle(Operation::ResetWithdraw, self.gadget.withdraw())?;

        // Step 2: same for the local mount
        let mount_point = self.mount.mount_point().to_path_buf();
        settle(Operation::ResetUnmount, self.mount.unmount(&mount_point))?;

        // Step 3: directories
        ensure_dir(&mount_point)?;
        ensure_dir(&self.config.image_dir)?;
        ensure_dir(&self.config.backup_dir)?;

        // Step 4: create missing images, leave existing ones alone
        let store = self.store;
        for image in store.images() {
            if image.path.exists() {
                tracing::debug!(image = %image.index, "backing image present");
                continue;
            }
            require(Operation::Provision, self.provisioner.provision(image))?;
            report.provisioned.push(image.index);
        }

        // Step 5: sanity pass over each image
        for image in store.images() {
            let count = self.check_image(image.index)?;
            if count > 0 {
                tracing::info!(image = %image.index, count, "found footage from a previous run");
                report.leftovers.push((image.index, count));
            }
        }

        tracing::info!(
            provisioned = report.provisioned.len(),
            with_leftovers = report.leftovers.len(),
            "startup checks complete"
        );
        Ok(report)
    }

    /// Mount, make sure the capture directory exists, count what is in it
    fn check_image(&mut self, index: ImageIndex) -> Result<usize> {
        let mount_path = require(Operation::Mount, self.mount.mount(self.store.image(index)))?;

        let capture_path = mount_path.join(&self.config.capture_dir);
        let counted = ensure_dir(&capture_path)
            .and_then(|()| transfer::count_entries(&capture_path, None));

        settle(Operation::Unmount, self.mount.unmount(&mount_path))?;
        counted
    }
}

/// Drain the images the startup pass found footage on
pub fn drain_leftovers<D: Drain>(
    report: &StartupReport,
    store: &ImageStore,
    drainer: &mut D,
    journal: Option<&Journal>,
) -> Result<Vec<DrainResult>> {
    let mut results = Vec::new();
    for (index, count) in &report.leftovers {
        tracing::info!(image = %index, count, "draining leftover footage");
        let result = drainer.drain(store.image(*index))?;
        if let Some(journal) = journal {
            let _ = settle(Operation::JournalWrite, journal.record(&result));
        }
        results.push(result);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Call, CallLog, FakeDrainer, FakeGadget, FakeMount, FakeProvisioner};
    use std::fs;
    use std::path::PathBuf;

    struct Fixture {
        _root: tempfile::TempDir,
        config: Config,
        store: ImageStore,
        log: CallLog,
        gadget: FakeGadget,
        mount: FakeMount,
        provisioner: FakeProvisioner,
    }

    impl Fixture {
        fn initialize(&mut self) -> Result<StartupReport> {
            StartupSequencer::new(
                &self.config,
                &self.store,
                &mut self.gadget,
                &mut self.mount,
                &mut self.provisioner,
            )
            .initialize()
        }

        fn capture_dir(&self) -> PathBuf {
            self.config.mount_point.join("teslacam")
        }
    }

    fn fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            image_dir: root.path().join("images"),
            backup_dir: root.path().join("video"),
            mount_point: root.path().join("mnt"),
            ..Config::default()
        };
        let store = ImageStore::new(&config.image_dir);
        let log = CallLog::default();
        Fixture {
            gadget: FakeGadget::new(log.clone()),
            mount: FakeMount::new(log.clone(), &config.mount_point),
            provisioner: FakeProvisioner::new(log.clone()),
            _root: root,
            config,
            store,
            log,
        }
    }

    #[test]
    fn test_fresh_install_provisions_both_images() {
        let mut f = fixture();

        let report = f.initialize().unwrap();

        assert_eq!(report.provisioned, [ImageIndex::Zero, ImageIndex::One]);
        assert!(report.leftovers.is_empty());
        assert!(f.config.backup_dir.is_dir());
        assert!(f.capture_dir().is_dir());
        assert_eq!(
            f.log.calls(),
            [
                Call::Withdraw,
                Call::Unmount(f.config.mount_point.clone()),
                Call::Provision(ImageIndex::Zero),
                Call::Provision(ImageIndex::One),
                Call::Mount(ImageIndex::Zero),
                Call::Unmount(f.config.mount_point.clone()),
                Call::Mount(ImageIndex::One),
                Call::Unmount(f.config.mount_point.clone()),
            ]
        );
    }

    #[test]
    fn test_only_missing_image_is_provisioned() {
        let mut f = fixture();
        fs::create_dir_all(&f.config.image_dir).unwrap();
        fs::write(&f.store.image(ImageIndex::Zero).path, b"existing image").unwrap();

        let report = f.initialize().unwrap();

        assert_eq!(report.provisioned, [ImageIndex::One]);
        assert_eq!(
            fs::read(&f.store.image(ImageIndex::Zero).path).unwrap(),
            b"existing image"
        );
        let provisions: Vec<Call> = f
            .log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Provision(_)))
            .collect();
        assert_eq!(provisions, [Call::Provision(ImageIndex::One)]);
    }

    #[test]
    fn test_provision_failure_is_fatal() {
        let mut f = fixture();
        f.provisioner.fail = true;

        assert!(f.initialize().is_err());
        assert!(!f.log.calls().iter().any(|c| matches!(c, Call::Mount(_))));
    }

    #[test]
    fn test_reset_failures_are_swallowed() {
        let mut f = fixture();
        f.gadget.fail_withdraw = true;
        f.mount.fail_unmount = true;

        assert!(f.initialize().is_ok());
    }

    #[test]
    fn test_mount_failure_in_sanity_pass_is_fatal() {
        let mut f = fixture();
        f.mount.fail_mount = true;

        assert!(f.initialize().is_err());
    }

    #[test]
    fn test_leftovers_are_reported() {
        let mut f = fixture();
        fs::create_dir_all(f.capture_dir()).unwrap();
        fs::write(f.capture_dir().join("clip.mp4"), b"clip").unwrap();

        let report = f.initialize().unwrap();

        // The fakes mount both images on the same directory
        assert_eq!(report.leftovers, [(ImageIndex::Zero, 1), (ImageIndex::One, 1)]);
    }

    #[test]
    fn test_drain_leftovers_runs_pipeline_per_image() {
        let f = fixture();
        let report = StartupReport {
            provisioned: vec![],
            leftovers: vec![(ImageIndex::One, 3)],
        };
        let mut drainer = FakeDrainer::new(f.log.clone(), []);
        let journal = Journal::open_in_memory().unwrap();

        let results = drain_leftovers(&report, &f.store, &mut drainer, Some(&journal)).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(f.log.calls(), [Call::Drain(ImageIndex::One)]);
        assert_eq!(journal.drain_count().unwrap(), 1);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let mut f = fixture();
        f.initialize().unwrap();

        let second = f.initialize().unwrap();
        assert!(second.provisioned.is_empty());
    }
}
