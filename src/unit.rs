//! In-memory model of one compiled unit (class file) as seen by the
//! renaming pass. Method bodies are not part of the model.

use bitflags::bitflags;

bitflags! {
    /// JVM access flags shared by classes, fields, methods and inner-class
    /// entries. Bits whose meaning depends on the context (`0x0020`,
    /// `0x0040`, `0x0080`) are exposed under both names.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct Access: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

/// Effective visibility derived from access flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

impl Access {
    pub fn visibility(self) -> Visibility {
        if self.contains(Access::PUBLIC) {
            Visibility::Public
        } else if self.contains(Access::PROTECTED) {
            Visibility::Protected
        } else if self.contains(Access::PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }

    /// Public or protected: part of the API a consumer can link against.
    pub fn is_exported(self) -> bool {
        matches!(self.visibility(), Visibility::Public | Visibility::Protected)
    }
}

/// Value of a `ConstantValue` attribute or an annotation constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

/// One annotation; `descriptor` is the annotation type's field descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub descriptor: String,
    pub visible: bool,
    pub elements: Vec<(String, ElementValue)>,
}

/// Annotation element value.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant; `tag` is one of `BCDFIJSZs`.
    Const { tag: u8, value: ConstantValue },
    Enum { descriptor: String, name: String },
    Class { descriptor: String },
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub access: Access,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub constant: Option<ConstantValue>,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    pub access: Access,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub annotation_default: Option<ElementValue>,
}

/// Entry of the `InnerClasses` attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct InnerClass {
    pub name: String,
    pub outer_name: Option<String>,
    pub simple_name: Option<String>,
    pub access: Access,
}

/// One compiled unit: declaration plus its fields and methods.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledUnit {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: Access,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub annotations: Vec<Annotation>,
    pub inner_classes: Vec<InnerClass>,
}

impl CompiledUnit {
    /// Minimal public class extending `java/lang/Object`, mostly for tests
    /// and synthesized units.
    pub fn new(name: impl Into<String>) -> Self {
        CompiledUnit {
            minor_version: 0,
            major_version: 52,
            access: Access::PUBLIC | Access::SUPER,
            name: name.into(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            signature: None,
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            inner_classes: Vec::new(),
        }
    }
}
