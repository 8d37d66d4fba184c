//! Field and method descriptors (`I`, `[Ljava/lang/String;`, `(IJ)V`).
//!
//! Descriptors are parsed into [`TypeDescriptor`] values and printed back
//! after renaming; the input string is never patched in place because a
//! renamed class name may have a different length.

use std::fmt;

use crate::error::DescriptorError;
use crate::rename::NameMapper;

/// Primitive descriptor tags, including `V` for void returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BaseType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl BaseType {
    fn from_tag(tag: u8) -> Option<Self> {
        let base = match tag {
            b'V' => BaseType::Void,
            b'Z' => BaseType::Boolean,
            b'B' => BaseType::Byte,
            b'C' => BaseType::Char,
            b'S' => BaseType::Short,
            b'I' => BaseType::Int,
            b'J' => BaseType::Long,
            b'F' => BaseType::Float,
            b'D' => BaseType::Double,
            _ => return None,
        };
        Some(base)
    }

    pub fn tag(self) -> char {
        match self {
            BaseType::Void => 'V',
            BaseType::Boolean => 'Z',
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
        }
    }
}

/// One parsed type descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeDescriptor {
    Base(BaseType),
    Array(Box<TypeDescriptor>),
    Object(String),
}

impl TypeDescriptor {
    /// Parses a complete field descriptor.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let mut cursor = Cursor::new(input, "descriptor");
        let parsed = cursor.type_descriptor()?;
        cursor.expect_end()?;
        Ok(parsed)
    }

    pub fn map_names<M: NameMapper + ?Sized>(&self, mapper: &M) -> TypeDescriptor {
        match self {
            TypeDescriptor::Base(base) => TypeDescriptor::Base(*base),
            TypeDescriptor::Array(element) => {
                TypeDescriptor::Array(Box::new(element.map_names(mapper)))
            }
            TypeDescriptor::Object(name) => {
                TypeDescriptor::Object(mapper.map_name(name).into_owned())
            }
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::Array(_) | TypeDescriptor::Object(_))
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Base(base) => write!(f, "{}", base.tag()),
            TypeDescriptor::Array(element) => write!(f, "[{element}"),
            TypeDescriptor::Object(name) => write!(f, "L{name};"),
        }
    }
}

/// Parameter types plus return type of a method descriptor.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodType {
    pub parameters: Vec<TypeDescriptor>,
    pub return_type: TypeDescriptor,
}

impl MethodType {
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let mut cursor = Cursor::new(input, "method descriptor");
        cursor.expect(b'(')?;
        let mut parameters = Vec::new();
        while cursor.peek() != Some(b')') {
            if cursor.at_end() {
                return Err(cursor.error("unterminated parameter list"));
            }
            let parameter = cursor.type_descriptor()?;
            if parameter == TypeDescriptor::Base(BaseType::Void) {
                return Err(cursor.error("void parameter type"));
            }
            parameters.push(parameter);
        }
        cursor.expect(b')')?;
        let return_type = cursor.type_descriptor()?;
        cursor.expect_end()?;
        Ok(MethodType {
            parameters,
            return_type,
        })
    }

    pub fn map_names<M: NameMapper + ?Sized>(&self, mapper: &M) -> MethodType {
        MethodType {
            parameters: self
                .parameters
                .iter()
                .map(|parameter| parameter.map_names(mapper))
                .collect(),
            return_type: self.return_type.map_names(mapper),
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{parameter}")?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// Renames every class name embedded in a field descriptor.
pub fn rewrite_descriptor<M: NameMapper + ?Sized>(
    desc: &str,
    mapper: &M,
) -> Result<String, DescriptorError> {
    Ok(TypeDescriptor::parse(desc)?.map_names(mapper).to_string())
}

/// Renames every class name in a method descriptor's parameters and return type.
pub fn rewrite_method_descriptor<M: NameMapper + ?Sized>(
    desc: &str,
    mapper: &M,
) -> Result<String, DescriptorError> {
    Ok(MethodType::parse(desc)?.map_names(mapper).to_string())
}

struct Cursor<'a> {
    input: &'a str,
    kind: &'static str,
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str, kind: &'static str) -> Self {
        Cursor {
            input,
            kind,
            index: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.index).copied()
    }

    fn at_end(&self) -> bool {
        self.index >= self.input.len()
    }

    fn error(&self, reason: &'static str) -> DescriptorError {
        DescriptorError {
            kind: self.kind,
            input: self.input.to_string(),
            position: self.index,
            reason,
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), DescriptorError> {
        if self.peek() != Some(byte) {
            return Err(self.error("unexpected character"));
        }
        self.index += 1;
        Ok(())
    }

    fn expect_end(&self) -> Result<(), DescriptorError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn type_descriptor(&mut self) -> Result<TypeDescriptor, DescriptorError> {
        let Some(tag) = self.peek() else {
            return Err(self.error("unexpected end of input"));
        };
        if let Some(base) = BaseType::from_tag(tag) {
            self.index += 1;
            return Ok(TypeDescriptor::Base(base));
        }
        match tag {
            b'[' => {
                self.index += 1;
                let element = self.type_descriptor()?;
                if element == TypeDescriptor::Base(BaseType::Void) {
                    return Err(self.error("array of void"));
                }
                Ok(TypeDescriptor::Array(Box::new(element)))
            }
            b'L' => {
                let start = self.index + 1;
                let Some(length) = self.input[start..].find(';') else {
                    return Err(self.error("object type without terminating `;`"));
                };
                if length == 0 {
                    return Err(self.error("empty class name"));
                }
                self.index = start + length + 1;
                Ok(TypeDescriptor::Object(self.input[start..start + length].to_string()))
            }
            _ => Err(self.error("unrecognized type tag")),
        }
    }
}
