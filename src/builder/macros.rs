//! Macros for ergonomic state machine construction.

/// Generate a key enum usable as a state or event key.
///
/// Derives everything [`StateKey`](crate::core::StateKey) and
/// [`EventKey`](crate::core::EventKey) require, plus `Copy`, ordering and
/// `Display`, and adds `name()` and `ALL`.
///
/// # Example
///
/// ```
/// use statecraft::key_enum;
///
/// key_enum! {
///     pub enum Door {
///         Opened,
///         Closed,
///         Locked,
///     }
/// }
///
/// assert_eq!(Door::Locked.name(), "Locked");
/// assert_eq!(Door::ALL.len(), 3);
/// assert_eq!(Door::Opened.to_string(), "Opened");
/// ```
#[macro_export]
macro_rules! key_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant
            ),*
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),*
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::core::{EventKey, StateKey};

    key_enum! {
        enum TestState {
            Initial,
            Processing,
            Complete,
        }
    }

    fn accepts_state<S: StateKey>(_state: S) {}
    fn accepts_event<E: EventKey>(_event: E) {}

    #[test]
    fn key_enum_macro_generates_keys() {
        let state = TestState::Processing;
        assert_eq!(state.name(), "Processing");
        assert_eq!(state.to_string(), "Processing");
        assert_eq!(TestState::ALL, &[TestState::Initial, TestState::Processing, TestState::Complete]);
        assert!(TestState::Initial < TestState::Complete);

        accepts_state(state);
        accepts_event(state);
    }

    #[test]
    fn key_enum_supports_visibility_and_attributes() {
        key_enum! {
            /// Public events
            pub enum PublicEvent {
                #[allow(dead_code)]
                Go,
                Stop,
            }
        }

        let json = serde_json::to_string(&PublicEvent::Stop).unwrap();
        assert_eq!(json, "\"Stop\"");
    }
}
