//! Plain-text pass/fail summary, suitable for a pull request comment

use crate::collector::EventGroups;
use crate::event::Action;

pub const ALL_PASSED: &str = "All tests passed!";
pub const FAILURES_HEADER: &str = "Oh no, test failures:";

/// One line per failed test, or [`ALL_PASSED`]
///
/// Package-level failures are not listed; they are implied by their tests.
pub fn generate(groups: &EventGroups) -> String {
    let failures: Vec<String> = groups
        .iter()
        .flat_map(|(_, events)| events)
        .filter(|event| event.action == Action::Fail && !event.test.is_empty())
        .map(|event| {
            format!(
                "\t{} {} failed after {}",
                event.package,
                event.test,
                event.elapsed.unwrap_or_default()
            )
        })
        .collect();

    if failures.is_empty() {
        return ALL_PASSED.to_string();
    }

    let mut lines = vec![FAILURES_HEADER.to_string()];
    lines.extend(failures);
    lines.join("\n")
}
