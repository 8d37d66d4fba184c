use std::collections::HashMap;

use std::str::FromStr;

use jdescriptor::MethodDescriptor;
use serde::{Deserialize, Serialize};

use crate::descriptor::{BaseType, MethodType, TypeDescriptor};
use crate::error::ConfigError;
use crate::ir::Constant;

/// Value returned by a synthesized stub.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnValue {
    Constant(Constant),
    /// Parameter register; for instance methods register 0 is the receiver.
    Parameter(u32),
}

/// What to do with a matched method.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReplacementAction {
    StubReturn { value: ReturnValue },
    StubVoid,
    StubThrow { exception: String },
    DeleteCall { class: String, method: String },
    /// `descriptor` is the field's type; reads are matched by name.
    ReplaceField {
        field: String,
        descriptor: String,
        value: Constant,
    },
}

impl ReplacementAction {
    /// Whether the action edits the existing program rather than replacing it.
    pub fn edits_in_place(&self) -> bool {
        matches!(
            self,
            ReplacementAction::DeleteCall { .. } | ReplacementAction::ReplaceField { .. }
        )
    }
}

/// One patch table row, also the shape of a `[[patch]]` config entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchEntry {
    pub class: String,
    pub method: String,
    pub descriptor: String,
    pub action: ReplacementAction,
}

impl PatchEntry {
    pub fn new(
        class: &str,
        method: &str,
        descriptor: &str,
        action: ReplacementAction,
    ) -> Self {
        PatchEntry {
            class: class.to_string(),
            method: method.to_string(),
            descriptor: descriptor.to_string(),
            action,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidPatch {
            class: self.class.clone(),
            method: format!("{}{}", self.method, self.descriptor),
            reason: reason.into(),
        }
    }

    /// Rejects entries whose action cannot produce a well-typed program.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let method_type =
            MethodType::parse(&self.descriptor).map_err(|error| self.invalid(error.to_string()))?;
        let declared = MethodDescriptor::from_str(&self.descriptor)
            .map_err(|error| self.invalid(error.to_string()))?
            .parameter_types()
            .len();
        let returns_void = method_type.return_type == TypeDescriptor::Base(BaseType::Void);
        match &self.action {
            ReplacementAction::StubVoid if !returns_void => {
                Err(self.invalid("stub-void on a method with a return value"))
            }
            ReplacementAction::StubReturn { .. } if returns_void => {
                Err(self.invalid("stub-return on a void method"))
            }
            ReplacementAction::StubReturn {
                value: ReturnValue::Constant(constant),
            } if !constant_fits(constant, &method_type.return_type) => Err(self.invalid(format!(
                "constant {constant} does not fit return type {}",
                method_type.return_type
            ))),
            // Register 0 is the receiver of instance methods, so the last
            // parameter register is at most `declared`.
            ReplacementAction::StubReturn {
                value: ReturnValue::Parameter(index),
            } if *index as usize > declared => Err(self.invalid(format!(
                "stub returns parameter {index} but the method declares {declared}"
            ))),
            ReplacementAction::StubThrow { exception } if exception.is_empty() => {
                Err(self.invalid("stub-throw without an exception class"))
            }
            ReplacementAction::ReplaceField {
                field,
                descriptor,
                value,
            } => {
                let field_type = TypeDescriptor::parse(descriptor)
                    .map_err(|error| self.invalid(error.to_string()))?;
                if constant_fits(value, &field_type) {
                    Ok(())
                } else {
                    Err(self.invalid(format!(
                        "constant {value} does not fit field {field} of type {field_type}"
                    )))
                }
            }
            _ => Ok(()),
        }
    }
}

fn constant_fits(constant: &Constant, descriptor: &TypeDescriptor) -> bool {
    match (constant, descriptor) {
        (Constant::Null, descriptor) => descriptor.is_reference(),
        (Constant::String(_), TypeDescriptor::Object(name)) => {
            name == "java/lang/String" || name == "java/lang/Object" || name == "java/lang/CharSequence"
        }
        (Constant::Int(_), TypeDescriptor::Base(base)) => matches!(
            base,
            BaseType::Boolean | BaseType::Byte | BaseType::Char | BaseType::Short | BaseType::Int
        ),
        (Constant::Long(_), TypeDescriptor::Base(BaseType::Long))
        | (Constant::Float(_), TypeDescriptor::Base(BaseType::Float))
        | (Constant::Double(_), TypeDescriptor::Base(BaseType::Double)) => true,
        _ => false,
    }
}

/// Patch targets keyed by exact class, method name and descriptor.
#[derive(Clone, Debug, Default)]
pub struct PatchTable {
    entries: HashMap<String, Vec<PatchEntry>>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in patches that let the compiler run without a file system,
    /// class loaders or process control.
    pub fn default_table() -> Self {
        use ReplacementAction::*;

        let entries = [
            PatchEntry::new(
                "com/sun/tools/javac/model/AnnotationProxyMaker",
                "generateAnnotation",
                "(Lcom/sun/tools/javac/code/Attribute$Compound;Ljava/lang/Class;)Ljava/lang/annotation/Annotation;",
                StubReturn {
                    value: ReturnValue::Constant(Constant::Null),
                },
            ),
            PatchEntry::new(
                "com/sun/tools/javac/api/BasicJavacTask",
                "initPlugins",
                "(Ljava/util/Set;)V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/api/BasicJavacTask",
                "initDocLint",
                "(Lcom/sun/tools/javac/util/List;)V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/main/JavaCompiler",
                "initProcessAnnotations",
                "(Ljava/lang/Iterable;Ljava/util/Collection;Ljava/util/Collection;)V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/main/JavaCompiler",
                "initProcessAnnotations",
                "(Ljava/lang/Iterable;)V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/main/JavaCompiler",
                "<init>",
                "(Lcom/sun/tools/javac/util/Context;)V",
                DeleteCall {
                    class: "com/sun/tools/javac/file/JavacFileManager".to_string(),
                    method: "preRegister".to_string(),
                },
            ),
            PatchEntry::new(
                "com/sun/tools/javac/file/BaseFileManager",
                "deferredClose",
                "()V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/comp/Modules",
                "filterAlreadyWarnedIncubatorModules",
                "(Ljava/util/stream/Stream;)Ljava/util/stream/Stream;",
                StubReturn {
                    value: ReturnValue::Parameter(1),
                },
            ),
            PatchEntry::new(
                "com/sun/tools/javac/processing/JavacProcessingEnvironment",
                "initProcessorClassLoader",
                "()V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/main/Main",
                "showClass",
                "(Ljava/lang/String;)V",
                StubVoid,
            ),
            PatchEntry::new(
                "com/sun/tools/javac/file/RegularFileObject",
                "isNameCompatible",
                "(Ljava/lang/String;Ljavax/tools/JavaFileObject$Kind;)Z",
                ReplaceField {
                    field: "isMacOS".to_string(),
                    descriptor: "Z".to_string(),
                    value: Constant::Int(0),
                },
            ),
            PatchEntry::new(
                "org/mozilla/javascript/Kit",
                "classOrNull",
                "(Ljava/lang/String;)Ljava/lang/Class;",
                StubReturn {
                    value: ReturnValue::Constant(Constant::Null),
                },
            ),
            PatchEntry::new(
                "java/lang/System",
                "exit",
                "(I)V",
                StubThrow {
                    exception: "java/lang/RuntimeException".to_string(),
                },
            ),
        ];

        let mut table = PatchTable::new();
        for entry in entries {
            table.insert(entry);
        }
        table
    }

    /// Adds an entry, replacing any entry with the same target.
    pub fn insert(&mut self, entry: PatchEntry) {
        let entries = self.entries.entry(entry.class.clone()).or_default();
        entries.retain(|existing| {
            existing.method != entry.method || existing.descriptor != entry.descriptor
        });
        entries.push(entry);
    }

    pub fn lookup(&self, class: &str, method: &str, descriptor: &str) -> Option<&ReplacementAction> {
        self.entries
            .get(class)?
            .iter()
            .find(|entry| entry.method == method && entry.descriptor == descriptor)
            .map(|entry| &entry.action)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.entries
            .values()
            .flatten()
            .try_for_each(PatchEntry::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid_and_matches_exactly() {
        let table = PatchTable::default_table();
        table.validate().expect("valid defaults");
        assert_eq!(table.len(), 13);
        assert_eq!(
            table.lookup("com/sun/tools/javac/main/Main", "showClass", "(Ljava/lang/String;)V"),
            Some(&ReplacementAction::StubVoid)
        );
        for descriptor in [
            "(Ljava/lang/Iterable;)V",
            "(Ljava/lang/Iterable;Ljava/util/Collection;Ljava/util/Collection;)V",
        ] {
            assert_eq!(
                table.lookup("com/sun/tools/javac/main/JavaCompiler", "initProcessAnnotations", descriptor),
                Some(&ReplacementAction::StubVoid)
            );
        }
        assert_eq!(
            table.lookup(
                "org/mozilla/javascript/Kit",
                "classOrNull",
                "(Ljava/lang/String;)Ljava/lang/Class;"
            ),
            Some(&ReplacementAction::StubReturn {
                value: ReturnValue::Constant(Constant::Null),
            })
        );
        // No prefix or overload matching.
        assert_eq!(
            table.lookup("com/sun/tools/javac/main/Main", "showClass", "()V"),
            None
        );
        assert_eq!(
            table.lookup("com/sun/tools/javac/main/Mai", "showClass", "(Ljava/lang/String;)V"),
            None
        );
    }

    #[test]
    fn insert_replaces_same_target() {
        let mut table = PatchTable::default_table();
        table.insert(PatchEntry::new(
            "java/lang/System",
            "exit",
            "(I)V",
            ReplacementAction::StubVoid,
        ));
        assert_eq!(table.len(), 13);
        assert_eq!(
            table.lookup("java/lang/System", "exit", "(I)V"),
            Some(&ReplacementAction::StubVoid)
        );
    }

    #[test]
    fn mismatched_actions_are_rejected() {
        let void_return = PatchEntry::new(
            "a/B",
            "size",
            "()I",
            ReplacementAction::StubVoid,
        );
        assert!(void_return.validate().is_err());
        let null_int = PatchEntry::new(
            "a/B",
            "size",
            "()I",
            ReplacementAction::StubReturn {
                value: ReturnValue::Constant(Constant::Null),
            },
        );
        assert!(null_int.validate().is_err());
        let bad_descriptor = PatchEntry::new("a/B", "m", "(I", ReplacementAction::StubVoid);
        assert!(bad_descriptor.validate().is_err());
    }

    #[test]
    fn parameter_beyond_the_descriptor_is_rejected() {
        let entry = |index| {
            PatchEntry::new(
                "a/B",
                "pick",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
                ReplacementAction::StubReturn {
                    value: ReturnValue::Parameter(index),
                },
            )
        };
        entry(1).validate().expect("receiver plus one parameter");
        assert!(matches!(
            entry(5).validate(),
            Err(ConfigError::InvalidPatch { reason, .. }) if reason.contains("parameter 5")
        ));
    }

    #[test]
    fn replaced_field_constant_must_fit_the_field_type() {
        let entry = |descriptor: &str, value| {
            PatchEntry::new(
                "a/B",
                "check",
                "()Z",
                ReplacementAction::ReplaceField {
                    field: "flag".to_string(),
                    descriptor: descriptor.to_string(),
                    value,
                },
            )
        };
        entry("Z", Constant::Int(0)).validate().expect("boolean field");
        assert!(entry("Z", Constant::Null).validate().is_err());
        assert!(entry("Ljava/lang/String;", Constant::Long(1)).validate().is_err());
        assert!(entry("Ljava/lang/String", Constant::Null).validate().is_err());
    }

    #[test]
    fn entries_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Entries {
            patch: Vec<PatchEntry>,
        }
        let parsed: Entries = toml::from_str(
            r#"
            [[patch]]
            class = "a/B"
            method = "run"
            descriptor = "()V"
            action = { kind = "delete-call", class = "x/Y", method = "log" }

            [[patch]]
            class = "a/B"
            method = "size"
            descriptor = "()J"
            action = { kind = "stub-return", value = { constant = { long = 4 } } }
            "#,
        )
        .expect("toml");
        assert_eq!(
            parsed.patch[0].action,
            ReplacementAction::DeleteCall {
                class: "x/Y".to_string(),
                method: "log".to_string(),
            }
        );
        assert_eq!(
            parsed.patch[1].action,
            ReplacementAction::StubReturn {
                value: ReturnValue::Constant(Constant::Long(4)),
            }
        );
    }
}
