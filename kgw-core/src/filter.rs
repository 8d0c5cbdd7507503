//! Ordered accept/reject evaluation of events.
//!
//! Rules are scanned in list order. A rule whose namespace and kind match
//! either decides immediately (no reasons listed) or scans its reasons; a
//! reason match decides, while exhausting the reasons falls through to the
//! next rule. An event no rule decides is rejected.

use kgw_sdk::config::FilterRule;
use kgw_sdk::objects::Event;
use tracing::debug;

/// Whether `event` passes `rules`. Pure and deterministic.
pub fn accept_event(rules: &[FilterRule], event: &Event) -> bool {
    let subject = &event.involved_object;
    for (i, rule) in rules.iter().enumerate() {
        let pass = rule.action.is_accept();
        if !rule.namespace.is_empty() && rule.namespace != subject.namespace {
            debug!(rule = i, "namespace mismatch");
            continue;
        }
        if !rule.kind.is_empty() && rule.kind != subject.kind {
            debug!(rule = i, "kind mismatch");
            continue;
        }
        if rule.reasons.is_empty() {
            debug!(rule = i, action = %rule.action, "matched all conditions of rule");
            return pass;
        }
        match rule.reasons.iter().position(|reason| *reason == event.reason) {
            Some(pos) => {
                debug!(rule = i, reason = pos, action = %rule.action, "reason matched");
                return pass;
            }
            None => debug!(rule = i, reason = %event.reason, "no reason matched"),
        }
    }
    debug!("default rejection");
    false
}
