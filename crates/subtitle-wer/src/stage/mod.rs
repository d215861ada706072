use std::pin::Pin;

use futures_util::Stream;

pub mod clean;
pub mod merge;
pub mod progress;
pub mod recognizer;
pub mod sampler;
pub mod writer;

/// A stage's output stream plus the number of samples expected through it.
pub struct StreamBundle<T> {
    pub stream: Pin<Box<dyn Stream<Item = T> + Send>>,
    pub total_samples: Option<u64>,
}

impl<T> StreamBundle<T> {
    pub fn new(stream: Pin<Box<dyn Stream<Item = T> + Send>>, total_samples: Option<u64>) -> Self {
        Self {
            stream,
            total_samples,
        }
    }
}
