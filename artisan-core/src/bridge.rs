//! Message channel between a sandboxed preview frame and the host view.
//!
//! The frame side is a click listener injected into the preview markup. It turns
//! clicks on internal links into [`BridgeMessage::Navigate`] and posts them to
//! the host. [`intercept_click`] is the same rule written in Rust. The host side
//! is a single [`BridgeReceiver`] drained by the workbench; delivery is
//! fire-and-forget and nothing is acknowledged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeMessage {
    Navigate { page: String },
}

impl BridgeMessage {
    pub fn navigate(page: impl Into<String>) -> Self {
        BridgeMessage::Navigate { page: page.into() }
    }

    /// Anything that is not exactly a navigate message yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// The parts of a clicked `<a>` element the listener looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    pub href: Option<String>,
    pub target: Option<String>,
}

impl Anchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Decides what a click on `anchor` (the closest `<a>` around the click target,
/// if any) turns into. Links meant for a new tab are left to the browser.
pub fn intercept_click(anchor: Option<&Anchor>) -> Option<BridgeMessage> {
    let anchor = anchor?;
    let href = anchor.href.as_deref().filter(|href| !href.is_empty())?;
    if anchor.target.as_deref() == Some("_blank") {
        return None;
    }
    let page = href.strip_prefix('/').unwrap_or(href);
    Some(BridgeMessage::navigate(page))
}

pub fn navigation_bridge() -> (BridgeSender, BridgeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BridgeSender { tx }, BridgeReceiver { rx })
}

#[derive(Debug, Clone)]
pub struct BridgeSender {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl BridgeSender {
    /// Queues `message` without waiting. Returns `false` once the receiving view
    /// is gone, in which case the message is dropped.
    pub fn post(&self, message: BridgeMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                debug!(message = ?err.0, "bridge listener closed; dropping message");
                false
            }
        }
    }

    pub fn post_value(&self, value: &Value) -> bool {
        match BridgeMessage::from_value(value) {
            Some(message) => self.post(message),
            None => {
                trace!(%value, "ignoring unrecognised bridge message");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single host-side consumer of a bridge. Dropping it tears the listener
/// down and turns every later post into a no-op.
#[derive(Debug)]
pub struct BridgeReceiver {
    rx: mpsc::UnboundedReceiver<BridgeMessage>,
}

impl BridgeReceiver {
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BridgeMessage> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn navigate_message_round_trips_wire_shape() {
        let message = BridgeMessage::navigate("about.html");
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({ "type": "navigate", "page": "about.html" })
        );
    }

    #[test]
    fn other_shapes_are_ignored() {
        assert!(BridgeMessage::from_value(&json!({ "type": "resize", "page": "a.html" })).is_none());
        assert!(BridgeMessage::from_value(&json!({ "type": "navigate" })).is_none());
        assert!(BridgeMessage::from_value(&json!({ "type": "navigate", "page": 3 })).is_none());
        assert!(BridgeMessage::from_value(&json!("navigate")).is_none());
        assert!(BridgeMessage::from_json("not json").is_none());
        assert_eq!(
            BridgeMessage::from_json(r#"{"type":"navigate","page":"a.html","extra":true}"#),
            Some(BridgeMessage::navigate("a.html"))
        );
    }

    #[test]
    fn click_on_internal_link_strips_one_leading_slash() {
        assert_eq!(
            intercept_click(Some(&Anchor::new("/about.html"))),
            Some(BridgeMessage::navigate("about.html"))
        );
        assert_eq!(
            intercept_click(Some(&Anchor::new("contact.html"))),
            Some(BridgeMessage::navigate("contact.html"))
        );
        assert_eq!(
            intercept_click(Some(&Anchor::new("//cdn.example"))),
            Some(BridgeMessage::navigate("/cdn.example"))
        );
    }

    #[test]
    fn blank_target_and_bare_anchors_pass_through() {
        let external = Anchor::new("https://example.com").with_target("_blank");
        assert!(intercept_click(Some(&external)).is_none());
        assert!(intercept_click(Some(&Anchor::default())).is_none());
        assert!(intercept_click(Some(&Anchor::new(""))).is_none());
        assert!(intercept_click(None).is_none());

        let same_tab = Anchor::new("/team.html").with_target("_self");
        assert!(intercept_click(Some(&same_tab)).is_some());
    }

    #[test]
    fn receiver_sees_messages_in_post_order() {
        let (sender, mut receiver) = navigation_bridge();
        let other = sender.clone();
        assert!(sender.post(BridgeMessage::navigate("a.html")));
        assert!(other.post_value(&json!({ "type": "navigate", "page": "b.html" })));
        assert!(!other.post_value(&json!({ "kind": "navigate" })));

        assert_eq!(receiver.try_recv(), Some(BridgeMessage::navigate("a.html")));
        assert_eq!(receiver.try_recv(), Some(BridgeMessage::navigate("b.html")));
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    fn posting_after_teardown_is_a_no_op() {
        let (sender, receiver) = navigation_bridge();
        drop(receiver);
        assert!(sender.is_closed());
        assert!(!sender.post(BridgeMessage::navigate("a.html")));
    }

    #[tokio::test]
    async fn recv_waits_for_the_next_message() {
        let (sender, mut receiver) = navigation_bridge();
        let task = tokio::spawn(async move { receiver.recv().await });
        sender.post(BridgeMessage::navigate("index.html"));
        assert_eq!(
            task.await.unwrap(),
            Some(BridgeMessage::navigate("index.html"))
        );
    }
}
