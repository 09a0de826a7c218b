//! Macro to clone a structure for use with configuration data

#![allow(meta_variable_misuse)] // false positives in these macro definitions

use derive_deftly::define_derive_deftly;

define_derive_deftly! {
    /// Clones a configuration structure so that every field becomes optional.
    ///
    /// The derived struct is what the command line parser fills in: a user only enters
    /// some of the settings, and only those should override the lower configuration layers.
    ///
    /// The new struct:
    /// * is named `{OriginalName}_Optional`
    /// * has the same fields as the original, with all their attributes, but with their types wrapped
    ///   in [`std::option::Option`]
    /// * carries every attribute that appears *after* the `derive_deftly` line, plus `#[derive(Default)]`
    ///   unless the original is marked `#[deftly(already_has_default)]`
    /// * implements [`figment::Provider`](https://docs.rs/figment/latest/figment/trait.Provider.html),
    ///   contributing only the fields that are `Some`
    ///
    /// ### Example
    ///
    /// ```
    /// use derive_deftly::Deftly;
    /// use smdp::derive_deftly_template_Optionalify;
    /// #[derive(Deftly)]
    /// #[derive_deftly(Optionalify)]
    /// #[derive(Debug, Clone, serde::Serialize)]
    /// struct MyStruct {
    ///     port: u16,
    /// }
    /// ```
    export Optionalify for struct, expect items:
    ${define OPTIONAL_TYPE ${paste $tdeftype _Optional}}

    /// Auto-derived struct variant with fields wrapped as `Option<...>`
    ///
    #[allow(non_camel_case_types)]
    ${tattrs}
    ${if not(tmeta(already_has_default)){
        #[derive(Default)]
    }}
    ${tvis} struct $OPTIONAL_TYPE {
        $(
            ${fattrs}
            ${fvis} $fname: Option<$ftype>,
        )
    }

    impl figment::Provider for $OPTIONAL_TYPE {
        fn metadata(&self) -> figment::Metadata {
            figment::Metadata::named("command-line").interpolater(|_profile, path| {
                use heck::ToKebabCase;
                let key = path.last().map_or("<unknown>".to_string(), |s| s.to_kebab_case());
                format!("--{key}")
            })
        }

        fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
            use figment::{Profile, value::{Dict, Map, Value}};
            let mut dict = Dict::new();
            $(
                if let Some(inner) = &self.${fname} {
                    let _ = dict.insert(stringify!($fname).to_string(), Value::serialize(inner)?);
                }
            )
            let mut profile_map = Map::new();
            let _ = profile_map.insert(Profile::Global, dict);
            Ok(profile_map)
        }
    }

    impl From<&$tdeftype> for $OPTIONAL_TYPE {
        fn from(value: &$tdeftype) -> Self {
            Self {
                $(
                    $fname: Some(value.$fname.clone()),
                )
            }
        }
    }
}

pub use derive_deftly_template_Optionalify;
