/// Declarative macro generating a string-backed enum from a single table of
/// `Variant => "wire"` pairs.
///
/// Produces the enum (with `#[serde(rename)]` per variant), an `ALL` constant
/// in definition order, `as_str`, `Display` and a strict `FromStr` that
/// rejects unknown strings with [`CoreError::UnknownVariant`].
///
/// [`CoreError::UnknownVariant`]: crate::errors::CoreError::UnknownVariant
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )*
        }

        impl $name {
            /// All variants in definition order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Canonical wire string.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::errors::CoreError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)*
                    _ => Err($crate::errors::CoreError::UnknownVariant {
                        kind: $label,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}
