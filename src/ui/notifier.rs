use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiSignal {
    SpinningStart,
    SpinningStop,
    Refresh,
}

impl UiSignal {
    pub fn method(&self) -> &'static str {
        match self {
            UiSignal::SpinningStart => "sync-icon.spinning.start",
            UiSignal::SpinningStop => "sync-icon.spinning.stop",
            UiSignal::Refresh => "ui.refresh",
        }
    }
}

/// Fire-and-forget sink for UI signals. Delivery is never acknowledged.
pub trait UiNotifier: Send + Sync {
    fn notify(&self, signal: UiSignal);
}

pub struct TracingNotifier;

impl UiNotifier for TracingNotifier {
    fn notify(&self, signal: UiSignal) {
        tracing::debug!("UI signal: {}", signal.method());
    }
}

pub struct ChannelNotifier {
    sender: UnboundedSender<UiSignal>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, UnboundedReceiver<UiSignal>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl UiNotifier for ChannelNotifier {
    fn notify(&self, signal: UiSignal) {
        // Nobody listening is fine.
        let _ = self.sender.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_map_to_message_methods() {
        assert_eq!(UiSignal::SpinningStart.method(), "sync-icon.spinning.start");
        assert_eq!(UiSignal::SpinningStop.method(), "sync-icon.spinning.stop");
        assert_eq!(UiSignal::Refresh.method(), "ui.refresh");
    }

    #[test]
    fn channel_notifier_delivers_in_order() {
        let (notifier, mut receiver) = ChannelNotifier::new();

        notifier.notify(UiSignal::SpinningStop);
        notifier.notify(UiSignal::Refresh);

        assert_eq!(receiver.try_recv().unwrap(), UiSignal::SpinningStop);
        assert_eq!(receiver.try_recv().unwrap(), UiSignal::Refresh);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn channel_notifier_ignores_dropped_receiver() {
        let (notifier, receiver) = ChannelNotifier::new();
        drop(receiver);

        notifier.notify(UiSignal::Refresh);
    }
}
