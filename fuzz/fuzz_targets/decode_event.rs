#![no_main]

use gotest_otel::collector::EventGroups;
use gotest_otel::event::EventStream;
use gotest_otel::reporter::TreeReporter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary transcripts must either decode and fold or fail cleanly
    let Ok(groups) = EventGroups::collect(EventStream::new(data), |_| {}) else {
        return;
    };

    let nodes = groups.fold();
    for node in nodes.values() {
        let _ = node.effective_interval();
    }
    let _ = TreeReporter::new(&nodes);
});
