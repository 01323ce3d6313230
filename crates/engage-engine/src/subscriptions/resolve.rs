//! Three-step subscription resolution.

use engage_core::Preference;

/// Resolve the effective subscription of one user.
///
/// A forced container wins over everything. A discussion override wins over
/// the container-level subscription. Without an override the container
/// subscription decides.
pub fn resolve(forced: bool, container_subscribed: bool, discussion_override: Option<Preference>) -> bool {
    if forced {
        return true;
    }
    match discussion_override {
        Some(preference) => preference.is_subscribed(),
        None => container_subscribed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERRIDES: [Option<Preference>; 3] = [
        None,
        Some(Preference::SubscribedSince(10)),
        Some(Preference::ExplicitlyUnsubscribed),
    ];

    #[test]
    fn forced_always_subscribed() {
        for container_subscribed in [false, true] {
            for discussion_override in OVERRIDES {
                assert!(resolve(true, container_subscribed, discussion_override));
            }
        }
    }

    #[test]
    fn override_beats_container() {
        assert!(resolve(false, false, Some(Preference::SubscribedSince(1))));
        assert!(!resolve(false, true, Some(Preference::ExplicitlyUnsubscribed)));
    }

    #[test]
    fn container_decides_without_override() {
        assert!(resolve(false, true, None));
        assert!(!resolve(false, false, None));
    }
}
