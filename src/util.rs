use rlimit::Resource;
use tracing::{debug, warn};

/// Sockets a single probe or fetch may hold open (redirect hops, DNS, ...)
const FILES_PER_TASK: u64 = 4;
const MIN_FILE_LIMIT: u64 = 1024;

/// Warns when the open file limit looks too low for `concurrency` parallel requests
pub fn warn_ulimit(concurrency: usize) {
    let Ok((limit, _)) = rlimit::getrlimit(Resource::NOFILE) else {
        debug!("Unable to read the open file limit");
        return;
    };

    let needed = (concurrency as u64 * FILES_PER_TASK).max(MIN_FILE_LIMIT);
    if limit < needed {
        warn!(
            "Your file limit ({limit}) is low for a concurrency of {concurrency} and may cause link checks to fail. Consider raising it via `ulimit -n {}`",
            needed * 4
        );
    }
}

/// Truncates a string to a maximum length, adding `...` to the end if it was truncated.
///
/// Backs off further when the cut would land in the middle of a UTF-8 codepoint.
#[must_use]
pub fn truncate_string(string: &str, max_length: usize) -> String {
    if string.len() <= max_length {
        return string.to_string();
    }

    let mut end = max_length.saturating_sub(3);
    while !string.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &string[..end])
}
