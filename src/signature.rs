//! Generic signatures as stored in `Signature` attributes.
//!
//! The rewriter is a recursive-descent parser that copies its input to the
//! output while renaming the erasure of every class type signature. Type
//! variable references (`TT;`) are local bindings and are copied verbatim,
//! as are the simple names of inner-class continuations (`.Entry`).

use crate::error::DescriptorError;
use crate::rename::NameMapper;

/// Rewrites a class signature: optional type parameters, then the superclass
/// and interface signatures.
pub fn rewrite_class_signature<M: NameMapper + ?Sized>(
    signature: &str,
    mapper: &M,
) -> Result<String, DescriptorError> {
    let mut rewriter = Rewriter::new(signature, mapper, "class signature");
    if rewriter.peek() == Some(b'<') {
        rewriter.type_parameters()?;
    }
    if rewriter.at_end() {
        return Err(rewriter.error("missing superclass signature"));
    }
    while !rewriter.at_end() {
        rewriter.class_type()?;
    }
    Ok(rewriter.finish())
}

/// Rewrites a field signature: exactly one reference type signature.
pub fn rewrite_field_signature<M: NameMapper + ?Sized>(
    signature: &str,
    mapper: &M,
) -> Result<String, DescriptorError> {
    let mut rewriter = Rewriter::new(signature, mapper, "field signature");
    rewriter.reference_type()?;
    if !rewriter.at_end() {
        return Err(rewriter.error("trailing characters"));
    }
    Ok(rewriter.finish())
}

/// Rewrites a method signature: optional type parameters, parameter types,
/// return type and `^`-prefixed throws clauses.
pub fn rewrite_method_signature<M: NameMapper + ?Sized>(
    signature: &str,
    mapper: &M,
) -> Result<String, DescriptorError> {
    let mut rewriter = Rewriter::new(signature, mapper, "method signature");
    if rewriter.peek() == Some(b'<') {
        rewriter.type_parameters()?;
    }
    rewriter.expect(b'(')?;
    loop {
        match rewriter.peek() {
            Some(b')') => break,
            None => return Err(rewriter.error("unterminated parameter list")),
            Some(_) => rewriter.java_type()?,
        }
    }
    rewriter.expect(b')')?;
    if rewriter.peek() == Some(b'V') {
        rewriter.copy_byte();
    } else {
        rewriter.java_type()?;
    }
    while !rewriter.at_end() {
        rewriter.expect(b'^')?;
        match rewriter.peek() {
            Some(b'L') => rewriter.class_type()?,
            Some(b'T') => rewriter.type_variable()?,
            _ => return Err(rewriter.error("throws clause must name a class or type variable")),
        }
    }
    Ok(rewriter.finish())
}

struct Rewriter<'a, M: ?Sized> {
    input: &'a str,
    index: usize,
    out: String,
    mapper: &'a M,
    kind: &'static str,
}

impl<'a, M: NameMapper + ?Sized> Rewriter<'a, M> {
    fn new(input: &'a str, mapper: &'a M, kind: &'static str) -> Self {
        Rewriter {
            input,
            index: 0,
            out: String::with_capacity(input.len()),
            mapper,
            kind,
        }
    }

    fn finish(self) -> String {
        self.out
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

    fn copy_byte(&mut self) {
        // Only called after peeking an ASCII delimiter or tag.
        self.out.push(self.input.as_bytes()[self.index] as char);
        self.index += 1;
    }

    fn expect(&mut self, byte: u8) -> Result<(), DescriptorError> {
        match self.peek() {
            Some(found) if found == byte => {
                self.copy_byte();
                Ok(())
            }
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Scans up to the next byte in `stops` and returns the scanned slice.
    fn scan_until(&mut self, stops: &[u8]) -> &'a str {
        let start = self.index;
        while let Some(byte) = self.peek() {
            if stops.contains(&byte) {
                break;
            }
            self.index += 1;
        }
        &self.input[start..self.index]
    }

    fn identifier(&mut self) -> Result<(), DescriptorError> {
        let identifier = self.scan_until(b".;[/<>:");
        if identifier.is_empty() {
            return Err(self.error("expected identifier"));
        }
        self.out.push_str(identifier);
        Ok(())
    }

    fn type_parameters(&mut self) -> Result<(), DescriptorError> {
        self.expect(b'<')?;
        if self.peek() == Some(b'>') {
            return Err(self.error("empty type parameter list"));
        }
        while self.peek() != Some(b'>') {
            if self.at_end() {
                return Err(self.error("unterminated type parameter list"));
            }
            self.identifier()?;
            if self.peek() != Some(b':') {
                return Err(self.error("type parameter without bound"));
            }
            while self.peek() == Some(b':') {
                self.copy_byte();
                // An empty class bound is followed directly by `:` or `>`.
                match self.peek() {
                    Some(b':') | Some(b'>') => {}
                    _ => self.reference_type()?,
                }
            }
        }
        self.expect(b'>')
    }

    fn java_type(&mut self) -> Result<(), DescriptorError> {
        match self.peek() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D') => {
                self.copy_byte();
                Ok(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Result<(), DescriptorError> {
        match self.peek() {
            Some(b'L') => self.class_type(),
            Some(b'T') => self.type_variable(),
            Some(b'[') => {
                self.copy_byte();
                self.java_type()
            }
            Some(_) => Err(self.error("expected reference type signature")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn type_variable(&mut self) -> Result<(), DescriptorError> {
        self.expect(b'T')?;
        self.identifier()?;
        self.expect(b';')
    }

    fn class_type(&mut self) -> Result<(), DescriptorError> {
        self.expect(b'L')?;
        let name = self.scan_until(b"<.;");
        if name.is_empty() {
            return Err(self.error("empty class name"));
        }
        let renamed = self.mapper.map_name(name);
        self.out.push_str(&renamed);
        if self.peek() == Some(b'<') {
            self.type_arguments()?;
        }
        while self.peek() == Some(b'.') {
            self.copy_byte();
            let simple = self.scan_until(b"<.;");
            if simple.is_empty() {
                return Err(self.error("empty inner class name"));
            }
            self.out.push_str(simple);
            if self.peek() == Some(b'<') {
                self.type_arguments()?;
            }
        }
        match self.peek() {
            Some(b';') => {
                self.copy_byte();
                Ok(())
            }
            _ => Err(self.error("class type signature without terminating `;`")),
        }
    }

    fn type_arguments(&mut self) -> Result<(), DescriptorError> {
        self.expect(b'<')?;
        if self.peek() == Some(b'>') {
            return Err(self.error("empty type argument list"));
        }
        loop {
            match self.peek() {
                Some(b'>') => break,
                Some(b'*') => self.copy_byte(),
                Some(b'+' | b'-') => {
                    self.copy_byte();
                    self.reference_type()?;
                }
                Some(_) => self.reference_type()?,
                None => return Err(self.error("unbalanced type argument list")),
            }
        }
        self.expect(b'>')
    }
}
