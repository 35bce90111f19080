//! Compile-time lookup tables between enum variants and wire literals.
//!
//! Every enum the API sends as a string is declared through [`wire_enum!`],
//! which emits the enum, an `ALL` slice, `as_wire`/`from_wire` lookups and
//! serde impls built on them. Literals this build does not know decode to
//! `Unknown` instead of failing the whole payload.

/// Declare an enum with an explicit variant ↔ literal table.
///
/// ```rust,ignore
/// wire_enum! {
///     /// Lifecycle of a thing.
///     pub enum ThingStatus {
///         Active => "active",
///         Closed => "closed",
///     }
/// }
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Literal not recognised by this version of the SDK.
            #[default]
            Unknown,
        }

        impl $name {
            /// All known variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire literal for this variant.
            #[must_use]
            pub const fn as_wire(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Unknown => "unknown",
                }
            }

            /// Parse a wire literal; unrecognised literals map to `Unknown`.
            #[must_use]
            pub fn from_wire(value: &str) -> Self {
                match value {
                    $( $wire => Self::$variant, )+
                    _ => Self::Unknown,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_wire())
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> ::std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_wire())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(
                deserializer: D,
            ) -> ::std::result::Result<Self, D::Error> {
                let value = <String as ::serde::Deserialize>::deserialize(deserializer)?;
                Ok(Self::from_wire(&value))
            }
        }
    };
}
