//! Recursive descent parser for the specification notation
//!
//! Produces the AST model the registration engine consumes. Parse errors
//! are fatal and carry the offending span.

use crate::ast::{
    Assignment, AssignmentKind, CharStringKind, Component, ComponentList, Constraint, Exports,
    FieldSpec, Member, Module, NamedNumber, Object, ObjectClass, ObjectFieldSetting, OidComponent,
    SymbolsFrom, Tag, TagClass, TagDefault, TagMode, Type, TypeKind, Value,
};
use crate::common::{CompileError, CompileResult};
use super::lexer::{Lexer, Token, TokenKind};

/// Recursive descent parser for one module
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    tag_default: TagDefault,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source
    pub fn new(source: &'a str) -> CompileResult<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            tag_default: TagDefault::Explicit,
        })
    }

    /// Parse one complete module
    pub fn parse(&mut self) -> CompileResult<Module> {
        let start = self.current.span;
        let name = self.expect_upper()?;
        // Optional module object identifier between name and DEFINITIONS
        if self.check(&TokenKind::LBrace) {
            self.skip_braces()?;
        }
        self.expect(TokenKind::Definitions)?;

        self.tag_default = match &self.current.kind {
            TokenKind::Automatic => {
                self.advance()?;
                self.expect(TokenKind::Tags)?;
                TagDefault::Automatic
            }
            TokenKind::Implicit => {
                self.advance()?;
                self.expect(TokenKind::Tags)?;
                TagDefault::Implicit
            }
            TokenKind::Explicit => {
                self.advance()?;
                self.expect(TokenKind::Tags)?;
                TagDefault::Explicit
            }
            _ => TagDefault::Explicit,
        };

        self.expect(TokenKind::Assign)?;
        self.expect(TokenKind::Begin)?;

        let mut module = Module::new(name, self.tag_default);
        module.exports = self.parse_exports()?;
        module.imports = self.parse_imports()?;

        while !self.check(&TokenKind::End) {
            module.assignments.push(self.parse_assignment()?);
        }
        let end = self.expect(TokenKind::End)?;
        module.span = start.merge(end.span);
        Ok(module)
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn advance(&mut self) -> CompileResult<Token> {
        let prev = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(prev)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> CompileResult<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.check(&kind) {
            self.advance()
        } else {
            Err(CompileError::parser(
                format!("expected {}, found {}", kind, self.current.kind),
                self.current.span,
            ))
        }
    }

    fn expect_upper(&mut self) -> CompileResult<String> {
        match self.current.kind.clone() {
            TokenKind::UpperIdent(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("expected a type reference, found {}", other),
                self.current.span,
            )),
        }
    }

    fn expect_lower(&mut self) -> CompileResult<String> {
        match self.current.kind.clone() {
            TokenKind::LowerIdent(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("expected an identifier, found {}", other),
                self.current.span,
            )),
        }
    }

    fn expect_any_ident(&mut self) -> CompileResult<String> {
        match self.current.kind.clone() {
            TokenKind::UpperIdent(name) | TokenKind::LowerIdent(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("expected a symbol name, found {}", other),
                self.current.span,
            )),
        }
    }

    fn expect_number(&mut self) -> CompileResult<i64> {
        let negative = self.match_token(&TokenKind::Minus)?;
        match self.current.kind {
            TokenKind::Number(n) => {
                self.advance()?;
                Ok(if negative { -n } else { n })
            }
            _ => Err(CompileError::parser(
                format!("expected a number, found {}", self.current.kind),
                self.current.span,
            )),
        }
    }

    // =========================================================================
    // Module body
    // =========================================================================

    fn parse_exports(&mut self) -> CompileResult<Exports> {
        if !self.match_token(&TokenKind::Exports)? {
            return Ok(Exports::All);
        }
        if self.match_token(&TokenKind::All)? {
            self.expect(TokenKind::Semi)?;
            return Ok(Exports::All);
        }
        let mut symbols = Vec::new();
        while !self.check(&TokenKind::Semi) {
            symbols.push(self.expect_any_ident()?);
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::Semi)?;
        Ok(Exports::Symbols(symbols))
    }

    fn parse_imports(&mut self) -> CompileResult<Vec<SymbolsFrom>> {
        if !self.match_token(&TokenKind::Imports)? {
            return Ok(Vec::new());
        }
        let mut imports = Vec::new();
        loop {
            let start = self.current.span;
            let mut symbols = vec![self.expect_any_ident()?];
            while self.match_token(&TokenKind::Comma)? {
                symbols.push(self.expect_any_ident()?);
            }
            self.expect(TokenKind::From)?;
            let module = self.expect_upper()?;
            if self.check(&TokenKind::LBrace) {
                self.skip_braces()?;
            }
            imports.push(SymbolsFrom {
                module,
                symbols,
                span: start.merge(self.current.span),
            });
            if self.match_token(&TokenKind::Semi)? {
                break;
            }
        }
        Ok(imports)
    }

    /// Consume a balanced brace group without interpreting it
    fn skip_braces(&mut self) -> CompileResult<()> {
        self.expect(TokenKind::LBrace)?;
        let mut depth = 1usize;
        while depth > 0 {
            match self.current.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => {
                    return Err(CompileError::parser(
                        "unterminated brace group",
                        self.current.span,
                    ));
                }
                _ => {}
            }
            self.advance()?;
        }
        Ok(())
    }

    // =========================================================================
    // Assignments
    // =========================================================================

    fn parse_assignment(&mut self) -> CompileResult<Assignment> {
        let start = self.current.span;
        match self.current.kind.clone() {
            TokenKind::UpperIdent(name) => {
                self.advance()?;
                self.expect(TokenKind::Assign)?;
                if self.match_token(&TokenKind::Class)? {
                    let mut class = self.parse_class_body()?;
                    class.name = Some(name.clone());
                    Ok(Assignment::new(
                        name,
                        AssignmentKind::ObjectClass(class),
                        start.merge(self.current.span),
                    ))
                } else {
                    let mut ty = self.parse_type()?;
                    ty.name = Some(name.clone());
                    Ok(Assignment::new(
                        name,
                        AssignmentKind::Type(ty),
                        start.merge(self.current.span),
                    ))
                }
            }
            TokenKind::LowerIdent(name) => {
                self.advance()?;
                let ty = self.parse_type()?;
                self.expect(TokenKind::Assign)?;
                let object_follows = self.check(&TokenKind::LBrace)
                    && matches!(self.lexer.peek(0)?.kind, TokenKind::FieldRef(_));
                if object_follows {
                    let class = match &ty.kind {
                        TypeKind::TypeRef { name: class, .. } => class.clone(),
                        _ => {
                            return Err(CompileError::parser(
                                "object assignment requires a class reference",
                                start,
                            ));
                        }
                    };
                    let fields = self.parse_object_body()?;
                    Ok(Assignment::new(
                        name,
                        AssignmentKind::Object(Object::new(class, fields)),
                        start.merge(self.current.span),
                    ))
                } else {
                    let value = self.parse_value()?;
                    Ok(Assignment::new(
                        name,
                        AssignmentKind::Value { ty, value },
                        start.merge(self.current.span),
                    ))
                }
            }
            other => Err(CompileError::parser(
                format!("expected an assignment, found {}", other),
                self.current.span,
            )),
        }
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn parse_type(&mut self) -> CompileResult<Type> {
        let start = self.current.span;
        let tags = self.parse_tag_prefixes()?;
        let mut ty = self.parse_base_type()?;
        while self.check(&TokenKind::LParen) {
            let constraint = self.parse_constraint()?;
            ty.constraint = Some(match ty.constraint.take() {
                Some(existing) => Constraint::Intersection(vec![existing, constraint]),
                None => constraint,
            });
        }
        ty.tags = tags;
        ty.span = start.merge(self.current.span);
        Ok(ty)
    }

    fn parse_tag_prefixes(&mut self) -> CompileResult<Vec<Tag>> {
        let mut tags = Vec::new();
        while self.check(&TokenKind::LBracket) {
            self.advance()?;
            let class = match self.current.kind {
                TokenKind::Universal => {
                    self.advance()?;
                    TagClass::Universal
                }
                TokenKind::Application => {
                    self.advance()?;
                    TagClass::Application
                }
                TokenKind::Private => {
                    self.advance()?;
                    TagClass::Private
                }
                _ => TagClass::Context,
            };
            let number = self.expect_number()?;
            self.expect(TokenKind::RBracket)?;
            let mode = if self.match_token(&TokenKind::Implicit)? {
                TagMode::Implicit
            } else if self.match_token(&TokenKind::Explicit)? {
                TagMode::Explicit
            } else {
                match self.tag_default {
                    TagDefault::Explicit => TagMode::Explicit,
                    TagDefault::Implicit | TagDefault::Automatic => TagMode::Implicit,
                }
            };
            tags.push(Tag::new(class, number, mode));
        }
        Ok(tags)
    }

    fn parse_base_type(&mut self) -> CompileResult<Type> {
        match self.current.kind.clone() {
            TokenKind::Boolean => {
                self.advance()?;
                Ok(Type::new(TypeKind::Boolean))
            }
            TokenKind::Integer => {
                self.advance()?;
                let named = if self.check(&TokenKind::LBrace) {
                    self.parse_named_numbers()?
                } else {
                    Vec::new()
                };
                Ok(Type::new(TypeKind::Integer { named }))
            }
            TokenKind::Enumerated => {
                self.advance()?;
                let (items, extensible) = self.parse_enum_items()?;
                Ok(Type::new(TypeKind::Enumerated { items, extensible }))
            }
            TokenKind::Real => {
                self.advance()?;
                Ok(Type::new(TypeKind::Real))
            }
            TokenKind::Bit => {
                self.advance()?;
                self.expect(TokenKind::StringKw)?;
                let named = if self.check(&TokenKind::LBrace) {
                    self.parse_named_numbers()?
                } else {
                    Vec::new()
                };
                Ok(Type::new(TypeKind::BitString { named }))
            }
            TokenKind::Octet => {
                self.advance()?;
                self.expect(TokenKind::StringKw)?;
                Ok(Type::new(TypeKind::OctetString))
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Type::new(TypeKind::Null))
            }
            TokenKind::Sequence => {
                self.advance()?;
                self.parse_list_type(true)
            }
            TokenKind::Set => {
                self.advance()?;
                self.parse_list_type(false)
            }
            TokenKind::Choice => {
                self.advance()?;
                let list = self.parse_components()?;
                Ok(Type::new(TypeKind::Choice(list)))
            }
            TokenKind::Object => {
                self.advance()?;
                self.expect(TokenKind::IdentifierKw)?;
                Ok(Type::new(TypeKind::ObjectIdentifier))
            }
            TokenKind::RelativeOid => {
                self.advance()?;
                Ok(Type::new(TypeKind::RelativeOid))
            }
            TokenKind::External => {
                self.advance()?;
                Ok(Type::new(TypeKind::External))
            }
            TokenKind::Embedded => {
                self.advance()?;
                self.expect(TokenKind::Pdv)?;
                Ok(Type::new(TypeKind::EmbeddedPdv))
            }
            TokenKind::Any => {
                self.advance()?;
                if self.match_token(&TokenKind::Defined)? {
                    self.expect(TokenKind::By)?;
                    self.expect_lower()?;
                }
                Ok(Type::new(TypeKind::Any))
            }
            TokenKind::Instance => {
                self.advance()?;
                self.expect(TokenKind::Of)?;
                let class = self.expect_upper()?;
                Ok(Type::new(TypeKind::InstanceOf { class }))
            }
            TokenKind::Utf8String => self.char_string(CharStringKind::Utf8),
            TokenKind::Ia5String => self.char_string(CharStringKind::Ia5),
            TokenKind::NumericString => self.char_string(CharStringKind::Numeric),
            TokenKind::PrintableString => self.char_string(CharStringKind::Printable),
            TokenKind::VisibleString => self.char_string(CharStringKind::Visible),
            TokenKind::BmpString => self.char_string(CharStringKind::Bmp),
            TokenKind::UniversalString => self.char_string(CharStringKind::Universal),
            TokenKind::GeneralString => self.char_string(CharStringKind::General),
            TokenKind::GraphicString => self.char_string(CharStringKind::Graphic),
            TokenKind::TeletexString => self.char_string(CharStringKind::Teletex),
            TokenKind::VideotexString => self.char_string(CharStringKind::Videotex),
            TokenKind::UpperIdent(name) => {
                self.advance()?;
                if self.match_token(&TokenKind::Dot)? {
                    if let TokenKind::FieldRef(_) = self.current.kind {
                        self.advance()?;
                        return Ok(Type::new(TypeKind::OpenType));
                    }
                    let target = self.expect_upper()?;
                    Ok(Type::new(TypeKind::TypeRef {
                        module: Some(name),
                        name: target,
                    }))
                } else {
                    Ok(Type::new(TypeKind::TypeRef { module: None, name }))
                }
            }
            TokenKind::LowerIdent(field) => {
                // Selection type: `field < Type`
                self.advance()?;
                self.expect(TokenKind::Less)?;
                let inner = self.parse_type()?;
                Ok(Type::new(TypeKind::Selection {
                    field,
                    inner: Box::new(inner),
                }))
            }
            TokenKind::FieldRef(_) => {
                self.advance()?;
                Ok(Type::new(TypeKind::OpenType))
            }
            other => Err(CompileError::parser(
                format!("expected a type, found {}", other),
                self.current.span,
            )),
        }
    }

    fn char_string(&mut self, kind: CharStringKind) -> CompileResult<Type> {
        self.advance()?;
        Ok(Type::new(TypeKind::CharacterString(kind)))
    }

    /// SEQUENCE/SET body: `{ components }`, or `[SIZE...] OF Element`
    fn parse_list_type(&mut self, is_sequence: bool) -> CompileResult<Type> {
        let mut pre_constraints = Vec::new();
        loop {
            if self.match_token(&TokenKind::Size)? {
                let inner = self.parse_constraint()?;
                pre_constraints.push(Constraint::Size(Box::new(inner)));
            } else if self.check(&TokenKind::LParen) {
                pre_constraints.push(self.parse_constraint()?);
            } else {
                break;
            }
        }

        if self.match_token(&TokenKind::Of)? {
            // Optional inline element name
            let elem_name = if let TokenKind::LowerIdent(name) = self.current.kind.clone() {
                if self.lexer.peek(0)?.kind == TokenKind::Less {
                    None
                } else {
                    self.advance()?;
                    Some(name)
                }
            } else {
                None
            };
            let mut element = self.parse_type()?;
            if element.name.is_none() {
                element.name = elem_name;
            }
            let kind = if is_sequence {
                TypeKind::SequenceOf(Box::new(element))
            } else {
                TypeKind::SetOf(Box::new(element))
            };
            let mut ty = Type::new(kind);
            ty.constraint = combine_constraints(pre_constraints);
            Ok(ty)
        } else {
            if !pre_constraints.is_empty() {
                return Err(CompileError::parser(
                    "size constraint requires OF",
                    self.current.span,
                ));
            }
            let list = self.parse_components()?;
            let kind = if is_sequence {
                TypeKind::Sequence(list)
            } else {
                TypeKind::Set(list)
            };
            Ok(Type::new(kind))
        }
    }

    fn parse_components(&mut self) -> CompileResult<ComponentList> {
        self.expect(TokenKind::LBrace)?;
        let mut components = Vec::new();
        let mut in_extension = false;

        if self.match_token(&TokenKind::RBrace)? {
            return Ok(ComponentList::new(components));
        }

        loop {
            if self.match_token(&TokenKind::Ellipsis)? {
                components.push(Component::ExtensionMarker);
                in_extension = true;
            } else if self.match_token(&TokenKind::Components)? {
                self.expect(TokenKind::Of)?;
                components.push(Component::ComponentsOf(self.parse_type()?));
            } else {
                let start = self.current.span;
                let name = self.expect_lower()?;
                let ty = self.parse_type()?;
                let optional = self.match_token(&TokenKind::Optional)?;
                let default = if self.match_token(&TokenKind::Default)? {
                    Some(self.parse_value()?)
                } else {
                    None
                };
                components.push(Component::Member(Member {
                    name,
                    ty,
                    optional,
                    default,
                    extension: in_extension,
                    span: start.merge(self.current.span),
                }));
            }
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(ComponentList::new(components))
    }

    fn parse_named_numbers(&mut self) -> CompileResult<Vec<NamedNumber>> {
        self.expect(TokenKind::LBrace)?;
        let mut named = Vec::new();
        loop {
            let start = self.current.span;
            let name = self.expect_lower()?;
            self.expect(TokenKind::LParen)?;
            let value = self.expect_number()?;
            self.expect(TokenKind::RParen)?;
            named.push(NamedNumber {
                name,
                value: Some(value),
                span: start,
            });
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(named)
    }

    fn parse_enum_items(&mut self) -> CompileResult<(Vec<NamedNumber>, bool)> {
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        let mut extensible = false;
        loop {
            if self.match_token(&TokenKind::Ellipsis)? {
                extensible = true;
            } else {
                let start = self.current.span;
                let name = self.expect_lower()?;
                let value = if self.match_token(&TokenKind::LParen)? {
                    let n = self.expect_number()?;
                    self.expect(TokenKind::RParen)?;
                    Some(n)
                } else {
                    None
                };
                items.push(NamedNumber {
                    name,
                    value,
                    span: start,
                });
            }
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok((items, extensible))
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Parse a parenthesized constraint, consuming the parens
    fn parse_constraint(&mut self) -> CompileResult<Constraint> {
        self.expect(TokenKind::LParen)?;
        let constraint = self.parse_constraint_body()?;
        self.expect(TokenKind::RParen)?;
        Ok(constraint)
    }

    fn parse_constraint_body(&mut self) -> CompileResult<Constraint> {
        let mut parts = vec![self.parse_constraint_intersection()?];
        let mut extensible = false;
        loop {
            if self.match_token(&TokenKind::Pipe)? || self.match_token(&TokenKind::Union)? {
                parts.push(self.parse_constraint_intersection()?);
            } else if self.check(&TokenKind::Comma)
                && self.lexer.peek(0)?.kind == TokenKind::Ellipsis
            {
                self.advance()?;
                self.advance()?;
                extensible = true;
                // Extension additions, if present, widen the union
                if self.match_token(&TokenKind::Comma)? {
                    parts.push(self.parse_constraint_intersection()?);
                }
            } else {
                break;
            }
        }
        let mut constraint = if parts.len() == 1 {
            parts.pop().expect("one part")
        } else {
            Constraint::Union(parts)
        };
        if extensible {
            mark_extensible(&mut constraint);
        }
        Ok(constraint)
    }

    fn parse_constraint_intersection(&mut self) -> CompileResult<Constraint> {
        let mut parts = vec![self.parse_constraint_atom()?];
        while self.match_token(&TokenKind::Caret)?
            || self.match_token(&TokenKind::Intersection)?
        {
            parts.push(self.parse_constraint_atom()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().expect("one part"))
        } else {
            Ok(Constraint::Intersection(parts))
        }
    }

    fn parse_constraint_atom(&mut self) -> CompileResult<Constraint> {
        match self.current.kind {
            TokenKind::Size => {
                self.advance()?;
                let inner = self.parse_constraint()?;
                Ok(Constraint::Size(Box::new(inner)))
            }
            TokenKind::From => {
                self.advance()?;
                let inner = self.parse_constraint()?;
                Ok(Constraint::PermittedAlphabet(Box::new(inner)))
            }
            TokenKind::Containing => {
                self.advance()?;
                let ty = self.parse_type()?;
                Ok(Constraint::Contents(Box::new(ty)))
            }
            TokenKind::LParen => self.parse_constraint(),
            TokenKind::Min => {
                self.advance()?;
                self.expect(TokenKind::DotDot)?;
                let hi = self.parse_range_end()?;
                Ok(Constraint::ValueRange {
                    lo: None,
                    hi,
                    extensible: false,
                })
            }
            _ => {
                let value = self.parse_value()?;
                if self.match_token(&TokenKind::DotDot)? {
                    let hi = self.parse_range_end()?;
                    Ok(Constraint::ValueRange {
                        lo: Some(value),
                        hi,
                        extensible: false,
                    })
                } else {
                    Ok(Constraint::SingleValue(value))
                }
            }
        }
    }

    fn parse_range_end(&mut self) -> CompileResult<Option<Value>> {
        if self.match_token(&TokenKind::Max)? {
            Ok(None)
        } else {
            Ok(Some(self.parse_value()?))
        }
    }

    // =========================================================================
    // Values
    // =========================================================================

    fn parse_value(&mut self) -> CompileResult<Value> {
        match self.current.kind.clone() {
            TokenKind::Minus | TokenKind::Number(_) => Ok(Value::Integer(self.expect_number()?)),
            TokenKind::True => {
                self.advance()?;
                Ok(Value::Boolean(true))
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Value::Boolean(false))
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Value::Null)
            }
            TokenKind::CString(text) => {
                self.advance()?;
                Ok(Value::String(text))
            }
            TokenKind::BString(text) | TokenKind::HString(text) => {
                self.advance()?;
                Ok(Value::BitHexString(text))
            }
            TokenKind::LowerIdent(name) => {
                self.advance()?;
                if self.match_token(&TokenKind::Colon)? {
                    let inner = self.parse_value()?;
                    Ok(Value::Choice {
                        arm: name,
                        value: Box::new(inner),
                    })
                } else {
                    Ok(Value::ValueRef(name))
                }
            }
            TokenKind::LBrace => self.parse_oid_value(),
            other => Err(CompileError::parser(
                format!("expected a value, found {}", other),
                self.current.span,
            )),
        }
    }

    fn parse_oid_value(&mut self) -> CompileResult<Value> {
        self.expect(TokenKind::LBrace)?;
        let mut components = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            match self.current.kind.clone() {
                TokenKind::LowerIdent(name) => {
                    self.advance()?;
                    if self.match_token(&TokenKind::LParen)? {
                        let number = self.expect_number()?;
                        self.expect(TokenKind::RParen)?;
                        components.push(OidComponent::named_number(name, number as u64));
                    } else {
                        components.push(OidComponent::name(name));
                    }
                }
                TokenKind::Number(n) => {
                    self.advance()?;
                    components.push(OidComponent::number(n as u64));
                }
                other => {
                    return Err(CompileError::parser(
                        format!("expected an object identifier arc, found {}", other),
                        self.current.span,
                    ));
                }
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Value::ObjectIdentifier(components))
    }

    // =========================================================================
    // Information object classes
    // =========================================================================

    fn parse_class_body(&mut self) -> CompileResult<ObjectClass> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            let name = match self.current.kind.clone() {
                TokenKind::FieldRef(name) => {
                    self.advance()?;
                    name
                }
                other => {
                    return Err(CompileError::parser(
                        format!("expected a class field, found {}", other),
                        self.current.span,
                    ));
                }
            };

            let starts_upper = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
            if starts_upper {
                let optional = self.match_token(&TokenKind::Optional)?;
                fields.push(FieldSpec::Type { name, optional });
            } else {
                let ty = self.parse_type()?;
                let unique = self.match_token(&TokenKind::Unique)?;
                let optional = self.match_token(&TokenKind::Optional)?;
                let field = match &ty.kind {
                    TypeKind::TypeRef { name: class, .. } if is_class_reference(class) => {
                        FieldSpec::Object {
                            name,
                            class: class.clone(),
                            optional,
                        }
                    }
                    _ => FieldSpec::FixedTypeValue {
                        name,
                        ty,
                        unique,
                        optional,
                    },
                };
                fields.push(field);
            }
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;

        let mut class = ObjectClass::new(fields);
        if self.match_token(&TokenKind::With)? {
            self.expect(TokenKind::Syntax)?;
            class.syntax = self.parse_syntax_words()?;
        }
        Ok(class)
    }

    /// Collect the WITH SYNTAX words verbatim, balancing braces
    fn parse_syntax_words(&mut self) -> CompileResult<Vec<String>> {
        self.expect(TokenKind::LBrace)?;
        let mut words = Vec::new();
        let mut depth = 1usize;
        loop {
            match self.current.kind.clone() {
                TokenKind::RBrace => {
                    depth -= 1;
                    self.advance()?;
                    if depth == 0 {
                        break;
                    }
                    words.push("]".to_string());
                }
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance()?;
                    words.push("[".to_string());
                }
                TokenKind::Eof => {
                    return Err(CompileError::parser(
                        "unterminated WITH SYNTAX clause",
                        self.current.span,
                    ));
                }
                TokenKind::UpperIdent(w) | TokenKind::LowerIdent(w) => {
                    self.advance()?;
                    words.push(w);
                }
                TokenKind::FieldRef(w) => {
                    self.advance()?;
                    words.push(format!("&{}", w));
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    words.push("[".to_string());
                }
                TokenKind::RBracket => {
                    self.advance()?;
                    words.push("]".to_string());
                }
                TokenKind::Comma => {
                    self.advance()?;
                    words.push(",".to_string());
                }
                other => {
                    self.advance()?;
                    words.push(format!("{}", other));
                }
            }
        }
        Ok(words)
    }

    fn parse_object_body(&mut self) -> CompileResult<Vec<(String, ObjectFieldSetting)>> {
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        loop {
            let name = match self.current.kind.clone() {
                TokenKind::FieldRef(name) => {
                    self.advance()?;
                    name
                }
                other => {
                    return Err(CompileError::parser(
                        format!("expected an object field, found {}", other),
                        self.current.span,
                    ));
                }
            };
            let setting = if self.type_follows() {
                ObjectFieldSetting::Type(self.parse_type()?)
            } else {
                ObjectFieldSetting::Value(self.parse_value()?)
            };
            fields.push((name, setting));
            if !self.match_token(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(fields)
    }

    fn type_follows(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::UpperIdent(_)
                | TokenKind::Boolean
                | TokenKind::Integer
                | TokenKind::Enumerated
                | TokenKind::Real
                | TokenKind::Bit
                | TokenKind::Octet
                | TokenKind::Sequence
                | TokenKind::Set
                | TokenKind::Choice
                | TokenKind::Object
                | TokenKind::External
                | TokenKind::Embedded
                | TokenKind::Any
                | TokenKind::Utf8String
                | TokenKind::Ia5String
                | TokenKind::NumericString
                | TokenKind::PrintableString
                | TokenKind::VisibleString
                | TokenKind::BmpString
                | TokenKind::UniversalString
                | TokenKind::GeneralString
                | TokenKind::GraphicString
                | TokenKind::TeletexString
                | TokenKind::VideotexString
                | TokenKind::LBracket
        )
    }
}

/// Class references are written in all caps in the notation
fn is_class_reference(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

fn combine_constraints(mut parts: Vec<Constraint>) -> Option<Constraint> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(Constraint::Intersection(parts)),
    }
}

/// Apply a trailing `, ...` extension marker to the bounds it widens
fn mark_extensible(constraint: &mut Constraint) {
    match constraint {
        Constraint::ValueRange { extensible, .. } => *extensible = true,
        Constraint::SingleValue(value) => {
            *constraint = Constraint::ValueRange {
                lo: Some(value.clone()),
                hi: Some(value.clone()),
                extensible: true,
            };
        }
        Constraint::Size(inner) | Constraint::PermittedAlphabet(inner) => {
            mark_extensible(inner);
        }
        Constraint::Union(parts) | Constraint::Intersection(parts) => {
            if let Some(last) = parts.last_mut() {
                mark_extensible(last);
            }
        }
        Constraint::Contents(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        Parser::new(source).expect("lexer").parse().expect("parse")
    }

    const SAMPLE: &str = r#"
Test-Protocol DEFINITIONS AUTOMATIC TAGS ::=
BEGIN

EXPORTS Message, Color;

IMPORTS Address, port-number FROM Net-Module;

maxSize INTEGER ::= 128

alg-id OBJECT IDENTIFIER ::= { iso member-body(2) 840 }

Color ::= ENUMERATED { red, green, blue, ... }

Message ::= SEQUENCE {
    id        INTEGER (0..255),
    body      OCTET STRING (SIZE(1..128)) OPTIONAL,
    flags     BIT STRING { urgent(0), ack(1) },
    addresses SEQUENCE SIZE(1..4) OF Address,
    extra     CHOICE {
        num   INTEGER,
        text  IA5String
    },
    ...
    ,
    more      BOOLEAN
}

Wrapped ::= [APPLICATION 3] EXPLICIT Message

Pick ::= num < Message

OPERATION ::= CLASS {
    &ArgumentType OPTIONAL,
    &operationCode INTEGER UNIQUE
} WITH SYNTAX {
    [ARGUMENT &ArgumentType]
    CODE &operationCode
}

getRequest OPERATION ::= { &ArgumentType Message, &operationCode 1 }

END
"#;

    #[test]
    fn test_module_header() {
        let module = parse(SAMPLE);
        assert_eq!(module.name, "Test-Protocol");
        assert_eq!(module.tag_default, TagDefault::Automatic);
        assert!(matches!(&module.exports, Exports::Symbols(s) if s.len() == 2));
        assert_eq!(module.imports.len(), 1);
        assert_eq!(module.imports[0].module, "Net-Module");
        assert_eq!(module.imports[0].symbols, vec!["Address", "port-number"]);
    }

    #[test]
    fn test_assignment_kinds() {
        let module = parse(SAMPLE);
        let kinds: Vec<&str> = module
            .assignments
            .iter()
            .map(|a| match &a.kind {
                AssignmentKind::Type(_) => "type",
                AssignmentKind::Value { .. } => "value",
                AssignmentKind::ObjectClass(_) => "class",
                AssignmentKind::Object(_) => "object",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["value", "value", "type", "type", "type", "type", "class", "object"]
        );
    }

    #[test]
    fn test_sequence_members() {
        let module = parse(SAMPLE);
        let message = module
            .assignments
            .iter()
            .find(|a| a.name == "Message")
            .expect("Message");
        let AssignmentKind::Type(ty) = &message.kind else {
            panic!("expected type");
        };
        let TypeKind::Sequence(list) = &ty.kind else {
            panic!("expected sequence");
        };
        let names: Vec<_> = list.members().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "body", "flags", "addresses", "extra", "more"]
        );
        assert!(list.is_extensible());
        let more = list.members().find(|m| m.name == "more").unwrap();
        assert!(more.extension);
        let body = list.members().find(|m| m.name == "body").unwrap();
        assert!(body.optional);
    }

    #[test]
    fn test_constraints_parse() {
        let module = parse(SAMPLE);
        let message = module
            .assignments
            .iter()
            .find(|a| a.name == "Message")
            .unwrap();
        let AssignmentKind::Type(ty) = &message.kind else {
            panic!();
        };
        let TypeKind::Sequence(list) = &ty.kind else {
            panic!();
        };
        let id = list.members().next().unwrap();
        let bounds = crate::ast::value_bounds(id.ty.constraint.as_ref());
        assert_eq!(bounds, crate::ast::Bounds::fixed(0, 255));

        let addresses = list.members().find(|m| m.name == "addresses").unwrap();
        let TypeKind::SequenceOf(element) = &addresses.ty.kind else {
            panic!("expected sequence-of");
        };
        assert!(matches!(
            &element.kind,
            TypeKind::TypeRef { name, .. } if name == "Address"
        ));
        let size = crate::ast::size_bounds(addresses.ty.constraint.as_ref());
        assert_eq!(size, crate::ast::Bounds::fixed(1, 4));
    }

    #[test]
    fn test_explicit_tag_prefix() {
        let module = parse(SAMPLE);
        let wrapped = module
            .assignments
            .iter()
            .find(|a| a.name == "Wrapped")
            .unwrap();
        let AssignmentKind::Type(ty) = &wrapped.kind else {
            panic!();
        };
        assert_eq!(
            ty.tags,
            vec![Tag::new(TagClass::Application, 3, TagMode::Explicit)]
        );
    }

    #[test]
    fn test_selection_type() {
        let module = parse(SAMPLE);
        let pick = module.assignments.iter().find(|a| a.name == "Pick").unwrap();
        let AssignmentKind::Type(ty) = &pick.kind else {
            panic!();
        };
        assert!(matches!(
            &ty.kind,
            TypeKind::Selection { field, .. } if field == "num"
        ));
    }

    #[test]
    fn test_class_and_object() {
        let module = parse(SAMPLE);
        let class = module
            .assignments
            .iter()
            .find(|a| a.name == "OPERATION")
            .unwrap();
        let AssignmentKind::ObjectClass(class) = &class.kind else {
            panic!("expected class");
        };
        assert_eq!(class.fields.len(), 2);
        assert!(matches!(
            class.field("ArgumentType"),
            Some(FieldSpec::Type { optional: true, .. })
        ));
        assert!(matches!(
            class.field("operationCode"),
            Some(FieldSpec::FixedTypeValue { unique: true, .. })
        ));
        assert!(!class.syntax.is_empty());

        let object = module
            .assignments
            .iter()
            .find(|a| a.name == "getRequest")
            .unwrap();
        let AssignmentKind::Object(object) = &object.kind else {
            panic!("expected object");
        };
        assert_eq!(object.class, "OPERATION");
        assert!(matches!(
            object.setting("operationCode"),
            Some(ObjectFieldSetting::Value(Value::Integer(1)))
        ));
    }

    #[test]
    fn test_value_assignments() {
        let module = parse(SAMPLE);
        let max = module
            .assignments
            .iter()
            .find(|a| a.name == "maxSize")
            .unwrap();
        assert!(matches!(
            &max.kind,
            AssignmentKind::Value { value: Value::Integer(128), .. }
        ));
        let alg = module
            .assignments
            .iter()
            .find(|a| a.name == "alg-id")
            .unwrap();
        let AssignmentKind::Value { value, .. } = &alg.kind else {
            panic!();
        };
        let Value::ObjectIdentifier(components) = value else {
            panic!("expected oid");
        };
        assert_eq!(components.len(), 3);
        assert_eq!(components[1].number, Some(2));
    }

    #[test]
    fn test_unterminated_module_is_fatal() {
        let result = Parser::new("Broken DEFINITIONS ::= BEGIN A ::= SEQUENCE {")
            .expect("lexer")
            .parse();
        assert!(matches!(result, Err(CompileError::Parser { .. })));
    }

    #[test]
    fn test_components_of_parses() {
        let module = parse(
            "M DEFINITIONS ::= BEGIN A ::= SEQUENCE { COMPONENTS OF B, x BOOLEAN } END",
        );
        let AssignmentKind::Type(ty) = &module.assignments[0].kind else {
            panic!();
        };
        let TypeKind::Sequence(list) = &ty.kind else {
            panic!();
        };
        assert!(matches!(&list.components[0], Component::ComponentsOf(_)));
    }

    #[test]
    fn test_negative_range() {
        let module =
            parse("M DEFINITIONS ::= BEGIN T ::= INTEGER (-5..5) END");
        let AssignmentKind::Type(ty) = &module.assignments[0].kind else {
            panic!();
        };
        let bounds = crate::ast::value_bounds(ty.constraint.as_ref());
        assert_eq!(bounds, crate::ast::Bounds::fixed(-5, 5));
    }

    #[test]
    fn test_extensible_range() {
        let module = parse("M DEFINITIONS ::= BEGIN T ::= INTEGER (0..7, ...) END");
        let AssignmentKind::Type(ty) = &module.assignments[0].kind else {
            panic!();
        };
        let bounds = crate::ast::value_bounds(ty.constraint.as_ref());
        assert!(bounds.extensible);
    }
}
