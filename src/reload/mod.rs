//! Hot configuration reload: diffs two directive trees and drives every
//! registered subscriber through the resulting notification sequence.

mod diff;
mod event;

pub use diff::diff;
pub use event::{ReloadEvent, ReloadEventHandler};

use crate::directive::Directive;
use crate::error::Result;

/// Output every [`ReloadEventHandler`] implementation returns: success or
/// a traced error that aborts the remainder of the reload.
pub type HandlerOutput = Result<()>;

/// Ordered registry of reload subscribers. Subscription order is dispatch
/// order within each notification.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Vec<(u64, Box<dyn ReloadEventHandler<Output = HandlerOutput>>)>,
    next_id: u64,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 1,
        }
    }

    pub fn subscribe(&mut self, handler: Box<dyn ReloadEventHandler<Output = HandlerOutput>>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push((id, handler));
        id
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Delivers `events` in order; within each event, subscribers run in
    /// subscription order. The first error aborts delivery of all
    /// remaining events and subscribers.
    fn dispatch(&mut self, events: Vec<ReloadEvent>) -> Result<()> {
        for event in events {
            for (_, handler) in &mut self.subscribers {
                event.clone().dispatch_with(handler.as_mut())?;
            }
        }
        Ok(())
    }
}

/// Owns the active directive tree and drives reloads against it.
pub struct ReloadEngine {
    active: Directive,
}

impl ReloadEngine {
    pub fn new(initial: Directive) -> Self {
        Self { active: initial }
    }

    pub fn active(&self) -> &Directive {
        &self.active
    }

    /// Diffs `candidate` against the active tree and dispatches the
    /// resulting notifications to `registry`. On success, `candidate`
    /// becomes the new active tree. On any failure (a rejected
    /// non-reloadable change, or a subscriber error), the active tree is
    /// left untouched — `candidate` is simply dropped.
    pub fn reload(&mut self, candidate: Directive, registry: &mut SubscriberRegistry) -> Result<Vec<ReloadEvent>> {
        let events = diff::diff(&self.active, &candidate)?;
        registry.dispatch(events.clone())?;
        self.active = candidate;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::parse_str;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    struct RecordingSubscriber(Rc<RefCell<Vec<String>>>);

    impl ReloadEventHandler for RecordingSubscriber {
        type Output = HandlerOutput;

        fn on_listen_changed(&mut self) -> Self::Output {
            self.0.borrow_mut().push("listen_changed".into());
            Ok(())
        }
        fn on_pid_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_log_tank_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_log_level_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_log_file_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_max_connections_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_utc_time_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_pithy_print_ms_changed(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_api_enabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_api_disabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_api_modified(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_api_crossdomain(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_api_raw_api(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_server_enabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_server_disabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_http_server_modified(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_rtc_server_enabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_rtc_server_disabled(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_rtc_server_modified(&mut self) -> Self::Output {
            Ok(())
        }
        fn on_vhost_added(&mut self, vhost: String) -> Self::Output {
            self.0.borrow_mut().push(format!("vhost_added:{}", vhost));
            Ok(())
        }
        fn on_vhost_removed(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_chunk_size(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_tcp_nodelay(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_min_latency(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_play(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_forward(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_dash(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_hls(&mut self, vhost: String) -> Self::Output {
            self.0.borrow_mut().push(format!("vhost_hls:{}", vhost));
            Ok(())
        }
        fn on_vhost_hds(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_dvr(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_exec(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_publish(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_http_static(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_vhost_http_remux(&mut self, _vhost: String) -> Self::Output {
            Ok(())
        }
        fn on_transcode_added(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
        fn on_transcode_removed(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
        fn on_transcode_updated(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
        fn on_ingest_added(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
        fn on_ingest_removed(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
        fn on_ingest_updated(&mut self, _vhost: String, _name: String) -> Self::Output {
            Ok(())
        }
    }

    fn parse(s: &str) -> Directive {
        parse_str(s, Path::new("t.conf")).unwrap()
    }

    #[test]
    fn reload_dispatches_hls_fragment_change_s5() {
        let t0 = parse("vhost v { hls { enabled on; hls_fragment 10; } }");
        let t1 = parse("vhost v { hls { enabled on; hls_fragment 5; } }");
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = SubscriberRegistry::new();
        registry.subscribe(Box::new(RecordingSubscriber(Rc::clone(&log))));
        let mut engine = ReloadEngine::new(t0);
        let events = engine.reload(t1, &mut registry).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(&*log.borrow(), &["vhost_hls:v"]);
    }

    #[test]
    fn rejected_reload_leaves_active_tree_untouched_s6() {
        let t0 = parse("vhost v { cluster { mode local; } }");
        let t1 = parse("vhost v { cluster { mode remote; } }");
        let mut registry = SubscriberRegistry::new();
        let mut engine = ReloadEngine::new(t0.copy(None));
        let err = engine.reload(t1, &mut registry).unwrap_err();
        assert!(matches!(err.as_ref(), crate::error::Error::EdgeModeChanged { .. }));
        assert!(engine.active().equals(&t0, None));
    }
}
