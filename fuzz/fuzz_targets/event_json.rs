#![no_main]

use libfuzzer_sys::fuzz_target;

use watchpost_core::event::SecurityEvent;
use watchpost_detection::{DetectorConfig, ThreatDetector};

// 수집 리스너가 받는 한 줄과 같은 경로: 역직렬화 후 탐지
fuzz_target!(|data: &[u8]| {
    let Ok(event) = serde_json::from_slice::<SecurityEvent>(data) else {
        return;
    };
    if let Ok(detector) = ThreatDetector::new(DetectorConfig::default()) {
        let _ = detector.detect(&event);
    }
});
