pub mod notifier;

pub use notifier::{ChannelNotifier, TracingNotifier, UiNotifier, UiSignal};
