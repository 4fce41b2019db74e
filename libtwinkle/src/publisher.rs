//! Publishing collaborator trait and implementations
//!
//! The scheduler hands a composed post and the current credentials to a
//! [`Publisher`] and gets back the collaborator's id for the published
//! post. The mock implementation simulates successes, failures, and
//! latency so scheduler behavior can be tested without network access.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::PublishError;
use crate::types::ComposedPost;

/// A destination that can publish composed posts.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the post, returning the collaborator's id for it.
    async fn publish(
        &self,
        post: &ComposedPost,
        credentials: &SecretString,
    ) -> std::result::Result<String, PublishError>;

    /// Human-readable destination name, for logs and status output.
    fn name(&self) -> &str;
}

/// A publisher that prints posts to stdout instead of sending them
/// anywhere. Useful for previews and dry runs.
pub struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    async fn publish(
        &self,
        post: &ComposedPost,
        _credentials: &SecretString,
    ) -> std::result::Result<String, PublishError> {
        println!("{}", post.body);
        if let Some(picture) = &post.picture {
            println!("[picture: {}]", picture);
        }
        Ok(format!("stdout-{}", uuid::Uuid::new_v4()))
    }

    fn name(&self) -> &str {
        "stdout"
    }
}

pub use mock::{MockConfig, MockPublisher};

mod mock {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};
    use tokio::time::sleep;

    use crate::error::PublishError;
    use crate::types::ComposedPost;

    use super::Publisher;

    /// Configuration for mock publisher behavior
    #[derive(Clone)]
    pub struct MockConfig {
        /// Destination name (e.g., "mock-feed")
        pub name: String,

        /// Error to return instead of succeeding, if any
        pub failure: Option<PublishError>,

        /// Delay before completing the publish (simulates latency)
        pub delay: Duration,

        /// Number of times publish has been called
        pub publish_call_count: Arc<Mutex<usize>>,

        /// Posts that have been published (for verification)
        pub published: Arc<Mutex<Vec<ComposedPost>>>,

        /// Credentials seen on each call (for verification)
        pub seen_credentials: Arc<Mutex<Vec<String>>>,
    }

    impl Default for MockConfig {
        fn default() -> Self {
            Self {
                name: "mock".to_string(),
                failure: None,
                delay: Duration::from_millis(0),
                publish_call_count: Arc::new(Mutex::new(0)),
                published: Arc::new(Mutex::new(Vec::new())),
                seen_credentials: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    /// Mock publisher for testing
    pub struct MockPublisher {
        config: MockConfig,
    }

    impl MockPublisher {
        pub fn new(config: MockConfig) -> Self {
            Self { config }
        }

        /// A mock that always succeeds
        pub fn success(name: &str) -> Self {
            Self::new(MockConfig {
                name: name.to_string(),
                ..Default::default()
            })
        }

        /// A mock that always fails with the given error
        pub fn failure(name: &str, error: PublishError) -> Self {
            Self::new(MockConfig {
                name: name.to_string(),
                failure: Some(error),
                ..Default::default()
            })
        }

        /// A mock that succeeds after the given delay
        pub fn with_delay(name: &str, delay: Duration) -> Self {
            Self::new(MockConfig {
                name: name.to_string(),
                delay,
                ..Default::default()
            })
        }

        /// Share the configuration so a test can inspect counters
        /// after handing the publisher to a scheduler.
        pub fn config(&self) -> MockConfig {
            self.config.clone()
        }

        pub fn publish_call_count(&self) -> usize {
            *self.config.publish_call_count.lock().unwrap()
        }

        pub fn published(&self) -> Vec<ComposedPost> {
            self.config.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for MockPublisher {
        async fn publish(
            &self,
            post: &ComposedPost,
            credentials: &SecretString,
        ) -> std::result::Result<String, PublishError> {
            *self.config.publish_call_count.lock().unwrap() += 1;
            self.config
                .seen_credentials
                .lock()
                .unwrap()
                .push(credentials.expose_secret().to_string());

            if !self.config.delay.is_zero() {
                sleep(self.config.delay).await;
            }

            if let Some(error) = &self.config.failure {
                return Err(error.clone());
            }

            self.config.published.lock().unwrap().push(post.clone());
            Ok(format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()))
        }

        fn name(&self) -> &str {
            &self.config.name
        }
    }
}
