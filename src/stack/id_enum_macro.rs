/// Declares a string-tagged identifier enum with a `Custom(String)` catch-all.
///
/// Each variant maps to a wire name (used for serde and lookups) and a display
/// name, plus optional aliases accepted by `parse`. Unknown input never fails:
/// it becomes `Custom` holding the lower-cased input.
#[macro_export]
macro_rules! define_id_enum {
    (
        $(#[$enum_meta:meta])*
        $enum_name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $wire_name:literal : $display_name:literal
                $( | $alias:literal )*
            ),* $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $enum_name {
            $(
                $(#[$variant_meta])*
                $variant,
            )*
            Custom(String),
        }

        impl $enum_name {
            /// Wire name, e.g. `"nextjs"`
            pub fn as_str(&self) -> &str {
                match self {
                    $(
                        Self::$variant => $wire_name,
                    )*
                    Self::Custom(name) => name,
                }
            }

            pub fn display_name(&self) -> &str {
                match self {
                    $(
                        Self::$variant => $display_name,
                    )*
                    Self::Custom(name) => name,
                }
            }

            /// Case-insensitive lookup over wire names and aliases
            pub fn parse(raw: &str) -> Self {
                let normalized = raw.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    $(
                        $wire_name $(| $alias)* => Self::$variant,
                    )*
                    _ => Self::Custom(normalized),
                }
            }

            pub fn is_custom(&self) -> bool {
                matches!(self, Self::Custom(_))
            }

            pub fn known() -> &'static [Self] {
                &[
                    $(
                        Self::$variant,
                    )*
                ]
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::parse(s))
            }
        }

        impl serde::Serialize for $enum_name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $enum_name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Ok(Self::parse(&s))
            }
        }
    };
}
