use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::surface::{ActionSurface, SurfaceError};

/// Outbound chat messages, decoupled from how the composer element is found.
/// Both the session runtime and the stall scheduler send through this seam,
/// never racing each other because stall sends only happen while normal turn
/// dispatch produces no outbound message.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_chat(&self, text: &str) -> Result<(), SurfaceError>;
}

/// Sends chat text by typing into the remembered composer element and
/// pressing Enter. The composer ref is learned from decision payloads as the
/// negotiation progresses; until one is known, sends fail with
/// [`SurfaceError::ComposerUnknown`].
pub struct ComposerChatSender {
    surface: Arc<dyn ActionSurface>,
    composer_ref: RwLock<Option<String>>,
}

impl ComposerChatSender {
    pub fn new(surface: Arc<dyn ActionSurface>) -> Self {
        Self { surface, composer_ref: RwLock::new(None) }
    }

    pub fn set_composer_ref(&self, element_ref: impl Into<String>) {
        let mut guard = match self.composer_ref.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(element_ref.into());
    }

    pub fn composer_ref(&self) -> Option<String> {
        match self.composer_ref.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ChatSender for ComposerChatSender {
    async fn send_chat(&self, text: &str) -> Result<(), SurfaceError> {
        let Some(element_ref) = self.composer_ref() else {
            return Err(SurfaceError::ComposerUnknown);
        };

        self.surface.type_text(&element_ref, text).await?;
        self.surface.press_key("Enter").await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::{ChatSender, ComposerChatSender};
    use crate::surface::{ActionSurface, SurfaceError};

    #[derive(Default)]
    struct RecordingSurface {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingSurface {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("calls lock").push(call);
        }
    }

    #[async_trait]
    impl ActionSurface for RecordingSurface {
        async fn navigate(&self, url: &str) -> Result<(), SurfaceError> {
            self.record(format!("navigate:{url}"));
            Ok(())
        }

        async fn snapshot(&self) -> Result<String, SurfaceError> {
            self.record("snapshot".to_owned());
            Ok(String::new())
        }

        async fn click(&self, element_ref: &str) -> Result<(), SurfaceError> {
            self.record(format!("click:{element_ref}"));
            Ok(())
        }

        async fn type_text(&self, element_ref: &str, text: &str) -> Result<(), SurfaceError> {
            self.record(format!("type:{element_ref}:{text}"));
            Ok(())
        }

        async fn press_key(&self, key: &str) -> Result<(), SurfaceError> {
            self.record(format!("press:{key}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn send_without_known_composer_fails() {
        let sender = ComposerChatSender::new(Arc::new(RecordingSurface::default()));
        let error = sender.send_chat("hello").await.expect_err("composer is unknown");
        assert_eq!(error, SurfaceError::ComposerUnknown);
    }

    #[tokio::test]
    async fn send_types_into_composer_and_presses_enter() {
        let surface = Arc::new(RecordingSurface::default());
        let sender = ComposerChatSender::new(surface.clone());
        sender.set_composer_ref("e42");

        sender.send_chat("still checking on my side").await.expect("send succeeds");

        assert_eq!(surface.calls(), vec!["type:e42:still checking on my side", "press:Enter"]);
    }
}
