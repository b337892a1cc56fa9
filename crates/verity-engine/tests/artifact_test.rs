use async_trait::async_trait;
use verity_engine::artifact::ArtifactCollector;
use verity_engine::driver::{ElementObservation, SessionDriver};
use verity_engine::error::HarnessError;
use verity_engine::mock::MockRule;
use verity_engine::selector::Selector;

/// Driver whose only job is to produce (or refuse to produce) screenshots.
struct ShutterDriver {
    fail: bool,
}

#[async_trait]
impl SessionDriver for ShutterDriver {
    async fn navigate(&mut self, _url: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, HarnessError> {
        Ok(String::new())
    }

    async fn observe(
        &mut self,
        _selector: &Selector,
    ) -> Result<ElementObservation, HarnessError> {
        Ok(ElementObservation::default())
    }

    async fn visible_text(&mut self) -> Result<String, HarnessError> {
        Ok(String::new())
    }

    async fn click(&mut self, _selector: &Selector) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn click_at(&mut self, _x: f64, _y: f64) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn fill(&mut self, _selector: &Selector, _text: &str) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn press_keys(
        &mut self,
        _selector: &Selector,
        _keys: &[String],
    ) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn scroll_into_view(&mut self, _selector: &Selector) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn register_mock(&mut self, _rule: MockRule) -> Result<(), HarnessError> {
        Ok(())
    }

    async fn take_mock_mismatches(&mut self) -> Vec<String> {
        Vec::new()
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, HarnessError> {
        if self.fail {
            Err(HarnessError::Protocol("no frame".into()))
        } else {
            Ok(b"\x89PNG-stub".to_vec())
        }
    }

    async fn close(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }

    fn is_detached(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn captures_are_sequence_numbered_and_sanitized() {
    let dir = tempfile::tempdir().unwrap();
    let mut collector = ArtifactCollector::new(dir.path());
    let mut driver = ShutterDriver { fail: false };

    let first = collector
        .capture_page(&mut driver, "dashboard desktop")
        .await
        .unwrap();
    let second = collector.capture_text("failure", "step: x\n").unwrap();

    assert_eq!(
        first.file_name().unwrap().to_string_lossy(),
        "001_dashboard_desktop.png"
    );
    assert_eq!(
        second.file_name().unwrap().to_string_lossy(),
        "002_failure.txt"
    );
    assert_eq!(std::fs::read(&first).unwrap(), b"\x89PNG-stub");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "step: x\n");
    assert_eq!(collector.written().len(), 2);
}

#[tokio::test]
async fn filenames_are_deterministic_across_runs() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let mut driver = ShutterDriver { fail: false };

    let mut first = ArtifactCollector::new(dir_a.path());
    let mut second = ArtifactCollector::new(dir_b.path());
    let a = first.capture_text("state", "1").unwrap();
    let b = second.capture_text("state", "1").unwrap();
    assert_eq!(a.file_name(), b.file_name());

    let a2 = first.capture_page(&mut driver, "state").await.unwrap();
    let b2 = second.capture_page(&mut driver, "state").await.unwrap();
    assert_eq!(a2.file_name(), b2.file_name());
}

#[tokio::test]
async fn a_failed_screenshot_is_absorbed() {
    let dir = tempfile::tempdir().unwrap();
    let mut collector = ArtifactCollector::new(dir.path());
    let mut driver = ShutterDriver { fail: true };

    let result = collector.capture_page(&mut driver, "diagnostic").await;
    assert!(result.is_none());
    assert!(collector.written().is_empty());

    // The sequence keeps advancing and later captures still land.
    let next = collector.capture_text("after", "ok").unwrap();
    assert_eq!(next.file_name().unwrap().to_string_lossy(), "002_after.txt");
}

#[tokio::test]
async fn an_unwritable_root_is_absorbed() {
    let dir = tempfile::tempdir().unwrap();
    // A file where the directory should be makes create_dir_all fail.
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, "file, not dir").unwrap();

    let mut collector = ArtifactCollector::new(&blocked);
    assert!(collector.capture_text("x", "y").is_none());
}
