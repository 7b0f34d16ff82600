//! Declarative table macros shared across the crate.

/// Declares numeric error codes together with their human readable messages.
///
/// Generates one `pub const` per entry and a `get_error_message` lookup.
macro_rules! define_error_codes {
    ($($name:ident = $code:literal => $msg:literal),* $(,)?) => {
        $(
            #[doc = $msg]
            pub const $name: u32 = $code;
        )*

        /// Returns the message registered for `code`.
        pub fn get_error_message(code: u32) -> &'static str {
            match code {
                $($code => $msg,)*
                _ => "Unknown Error",
            }
        }
    };
}

/// Declares the attribute table: variant, serialized key and the line of the
/// status report the value is read from.
macro_rules! define_attributes {
    ($($variant:ident = ($key:literal, $line:literal)),* $(,)?) => {
        /// A named field of the device status report.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Attribute {
            $($variant,)*
        }

        impl Attribute {
            /// Every attribute, in report order.
            pub const ALL: &'static [Attribute] = &[$(Attribute::$variant,)*];

            /// Key used in the attribute bag and the published JSON payload.
            pub fn key(&self) -> &'static str {
                match self {
                    $(Attribute::$variant => $key,)*
                }
            }

            /// Zero-based line of the status report holding this value.
            pub fn line(&self) -> usize {
                match self {
                    $(Attribute::$variant => $line,)*
                }
            }
        }
    };
}
