//! Test doubles for the external-tool seams.

mod mock_fetcher;
mod mock_transcoder;

pub use mock_fetcher::MockFetcher;
pub use mock_transcoder::{MockTranscoder, RecordedTranscode};
