use crate::entity::{normalize_name, ClassFlavor, Entity, EntityKind, SourceUnitReflection};
use crate::error::BuildError;
use crate::path::SourcePath;
use refbroker_lexer::{Token, TokenKind, TokenStream, NAMESPACE_SEPARATOR};
use std::collections::{HashMap, HashSet};

/// Builds the structural entities declared in one token stream
pub trait EntityBuilder {
    fn build(
        &self,
        path: &SourcePath,
        tokens: &TokenStream,
    ) -> Result<SourceUnitReflection, BuildError>;
}

/// Default builder: namespaces, class-likes, functions and constants
/// declared outside of class and function bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarationBuilder;

impl EntityBuilder for DeclarationBuilder {
    fn build(
        &self,
        path: &SourcePath,
        tokens: &TokenStream,
    ) -> Result<SourceUnitReflection, BuildError> {
        check_brace_balance(tokens)?;
        let mut walker = Walker::new(path, tokens);
        walker.run()?;
        Ok(walker.unit)
    }
}

fn check_brace_balance(tokens: &TokenStream) -> Result<(), BuildError> {
    let mut open_lines = Vec::new();
    for token in tokens {
        if token.is_punct("{") {
            open_lines.push(token.line);
        } else if token.is_punct("}") && open_lines.pop().is_none() {
            return Err(BuildError::UnbalancedBraces { line: token.line });
        }
    }
    match open_lines.last() {
        Some(&line) => Err(BuildError::UnbalancedBraces { line }),
        None => Ok(()),
    }
}

struct Walker<'a> {
    path: &'a SourcePath,
    tokens: &'a TokenStream,
    unit: SourceUnitReflection,
    namespace: String,
    /// Index of the `}` closing a braced namespace
    namespace_end: Option<usize>,
    /// Lowercased alias -> qualified name, reset per namespace
    imports: HashMap<String, String>,
    declared: HashSet<(EntityKind, String)>,
    /// Index of the previous significant token
    prev: Option<usize>,
    pending_doc: Option<String>,
    modifier_line: Option<u32>,
}

impl<'a> Walker<'a> {
    fn new(path: &'a SourcePath, tokens: &'a TokenStream) -> Self {
        Self {
            path,
            tokens,
            unit: SourceUnitReflection::new(path.clone(), tokens.len()),
            namespace: String::new(),
            namespace_end: None,
            imports: HashMap::new(),
            declared: HashSet::new(),
            prev: None,
            pending_doc: None,
            modifier_line: None,
        }
    }

    fn token(&self, idx: usize) -> &'a Token {
        &self.tokens.as_slice()[idx]
    }

    fn run(&mut self) -> Result<(), BuildError> {
        let mut idx = 0;
        while idx < self.tokens.len() {
            let token = self.token(idx);
            if token.kind == TokenKind::DocComment {
                self.pending_doc = Some(token.text.clone());
                idx += 1;
                continue;
            }
            if token.is_trivia() {
                idx += 1;
                continue;
            }

            let next = match token.kind {
                TokenKind::Namespace if self.at_statement_start() => {
                    self.namespace_declaration(idx)?
                }
                TokenKind::Use if self.at_statement_start() => self.use_statement(idx),
                TokenKind::Abstract | TokenKind::Final => {
                    self.modifier_line.get_or_insert(token.line);
                    self.prev = Some(idx);
                    idx += 1;
                    continue;
                }
                kind if kind.is_class_like() && self.follows(&[TokenKind::New]) => {
                    self.skip_anonymous_class(idx)
                }
                kind if kind.is_class_like() && self.is_declaration_keyword() => {
                    self.class_declaration(idx)?
                }
                TokenKind::Function if self.is_declaration_keyword() => {
                    self.function_declaration(idx)?
                }
                TokenKind::Const if self.at_statement_start() => self.const_declaration(idx)?,
                TokenKind::Punct if self.namespace_end == Some(idx) => {
                    self.namespace_end = None;
                    self.enter_namespace(String::new(), token.line);
                    idx + 1
                }
                _ => idx + 1,
            };

            self.pending_doc = None;
            self.modifier_line = None;
            self.prev = Some(next - 1);
            idx = next;
        }
        Ok(())
    }

    fn prev_token(&self) -> Option<&'a Token> {
        self.prev.map(|idx| self.token(idx))
    }

    fn follows(&self, kinds: &[TokenKind]) -> bool {
        self.prev_token().is_some_and(|t| kinds.contains(&t.kind))
    }

    fn at_statement_start(&self) -> bool {
        match self.prev_token() {
            None => true,
            Some(t) => {
                matches!(t.kind, TokenKind::OpenTag | TokenKind::CloseTag)
                    || t.is_punct(";")
                    || t.is_punct("{")
                    || t.is_punct("}")
            }
        }
    }

    /// Keyword not used as a member name or `Foo::class`
    fn is_declaration_keyword(&self) -> bool {
        !self.follows(&[TokenKind::New])
            && !self
                .prev_token()
                .is_some_and(|t| t.is_punct("::") || t.is_punct("->") || t.is_punct("?->"))
    }

    fn next_significant(&self, from: usize) -> Option<usize> {
        self.tokens.next_significant(from)
    }

    /// Unqualified name token following `keyword_idx`
    fn expect_name(&self, keyword_idx: usize) -> Result<(usize, &'a Token), BuildError> {
        let keyword = self.token(keyword_idx);
        self.next_significant(keyword_idx + 1)
            .map(|idx| (idx, self.token(idx)))
            .filter(|(_, t)| t.kind == TokenKind::Name && !t.text.contains(NAMESPACE_SEPARATOR))
            .ok_or_else(|| BuildError::MissingName {
                keyword: keyword.text.to_ascii_lowercase(),
                line: keyword.line,
            })
    }

    fn namespace_declaration(&mut self, idx: usize) -> Result<usize, BuildError> {
        let keyword = self.token(idx);
        if self.namespace_end.is_some() {
            return Err(BuildError::NestedNamespace { line: keyword.line });
        }
        let missing = || BuildError::MissingName {
            keyword: "namespace".to_string(),
            line: keyword.line,
        };

        let name_idx = self.next_significant(idx + 1).ok_or_else(missing)?;
        let name_token = self.token(name_idx);
        let (name, after) = match name_token.kind {
            TokenKind::Name => (
                normalize_name(&name_token.text).to_string(),
                self.next_significant(name_idx + 1).ok_or_else(missing)?,
            ),
            TokenKind::Punct if name_token.text == "{" => (String::new(), name_idx),
            _ => return Err(missing()),
        };

        let terminator = self.token(after);
        if terminator.is_punct("{") {
            // balance was checked up front
            self.namespace_end = self.tokens.matching_bracket(after);
        } else if !terminator.is_punct(";") {
            return Err(missing());
        }
        self.enter_namespace(name, keyword.line);
        Ok(after + 1)
    }

    fn enter_namespace(&mut self, name: String, line: u32) {
        self.imports.clear();
        if !name.is_empty() && !self.declared.contains(&(EntityKind::Namespace, name.clone())) {
            let end_line = self
                .namespace_end
                .map_or_else(|| self.tokens.last_line(), |end| self.token(end).line);
            self.declared.insert((EntityKind::Namespace, name.clone()));
            self.unit.push(
                Entity::declared(EntityKind::Namespace, name.clone(), self.path.clone())
                    .lines(line, end_line),
            );
        }
        self.namespace = name;
    }

    /// Record `use A\B [as C], ...;` class imports; function and const imports are skipped
    fn use_statement(&mut self, idx: usize) -> usize {
        let mut current: Option<String> = None;
        let mut alias: Option<String> = None;
        let mut expecting_alias = false;
        let mut skip = false;

        let mut cursor = idx + 1;
        while cursor < self.tokens.len() {
            let token = self.token(cursor);
            cursor += 1;
            if token.is_trivia() {
                continue;
            }
            match token.kind {
                TokenKind::Function | TokenKind::Const if current.is_none() => skip = true,
                TokenKind::Name if token.text.eq_ignore_ascii_case("as") => {
                    expecting_alias = true;
                }
                TokenKind::Name if expecting_alias => {
                    alias = Some(token.text.clone());
                    expecting_alias = false;
                }
                TokenKind::Name => current = Some(normalize_name(&token.text).to_string()),
                TokenKind::Punct if token.text == "{" => skip = true,
                TokenKind::Punct if token.text == "," || token.text == ";" => {
                    if let (Some(name), false) = (current.take(), skip) {
                        let alias = alias.take().unwrap_or_else(|| last_segment(&name).to_string());
                        self.imports.insert(alias.to_ascii_lowercase(), name);
                    }
                    alias = None;
                    if token.text == ";" {
                        break;
                    }
                }
                _ => {}
            }
        }
        cursor
    }

    fn qualify(&self, short: &str) -> String {
        if self.namespace.is_empty() {
            short.to_string()
        } else {
            format!("{}{NAMESPACE_SEPARATOR}{short}", self.namespace)
        }
    }

    /// Resolve a class reference against the namespace and imports
    fn resolve(&self, name: &str) -> String {
        if name.starts_with(NAMESPACE_SEPARATOR) {
            return normalize_name(name).to_string();
        }
        let (head, tail) = match name.split_once(NAMESPACE_SEPARATOR) {
            Some((head, tail)) => (head, Some(tail)),
            None => (name, None),
        };
        if head.eq_ignore_ascii_case("namespace") {
            return self.qualify(tail.unwrap_or_default());
        }
        match (self.imports.get(&head.to_ascii_lowercase()), tail) {
            (Some(imported), Some(tail)) => format!("{imported}{NAMESPACE_SEPARATOR}{tail}"),
            (Some(imported), None) => imported.clone(),
            (None, _) => self.qualify(name),
        }
    }

    fn declare(&mut self, entity: Entity) -> Result<(), BuildError> {
        if !self
            .declared
            .insert((entity.kind, entity.name.clone()))
        {
            return Err(BuildError::DuplicateDeclaration {
                kind: entity.kind,
                name: entity.name,
                line: entity.start_line,
            });
        }
        if self.namespace.is_empty()
            && self
                .declared
                .insert((EntityKind::Namespace, String::new()))
        {
            self.unit.push(
                Entity::declared(EntityKind::Namespace, "", self.path.clone())
                    .lines(entity.start_line, self.tokens.last_line()),
            );
        }
        self.unit.push(entity);
        Ok(())
    }

    fn class_declaration(&mut self, idx: usize) -> Result<usize, BuildError> {
        let keyword = self.token(idx);
        let flavor = match keyword.kind {
            TokenKind::Interface => ClassFlavor::Interface,
            TokenKind::Trait => ClassFlavor::Trait,
            _ => ClassFlavor::Class,
        };
        let (name_idx, name) = self.expect_name(idx)?;
        let qualified = self.qualify(&name.text);

        let mut parents = Vec::new();
        let mut interfaces = Vec::new();
        let mut in_implements = false;
        let mut cursor = name_idx + 1;
        let body = loop {
            let Some(token) = self.tokens.get(cursor) else {
                return Err(BuildError::MissingBody {
                    name: qualified,
                    line: keyword.line,
                });
            };
            match token.kind {
                TokenKind::Extends => in_implements = false,
                TokenKind::Implements => in_implements = true,
                TokenKind::Name if in_implements => interfaces.push(self.resolve(&token.text)),
                TokenKind::Name => parents.push(self.resolve(&token.text)),
                TokenKind::Punct if token.text == "{" => break cursor,
                TokenKind::Punct if token.text == "," => {}
                _ if token.is_trivia() => {}
                _ => {
                    return Err(BuildError::MissingBody {
                        name: qualified,
                        line: token.line,
                    })
                }
            }
            cursor += 1;
        };
        let close = self
            .tokens
            .matching_bracket(body)
            .ok_or(BuildError::UnbalancedBraces { line: keyword.line })?;

        let start_line = self.modifier_line.unwrap_or(keyword.line);
        let mut entity = Entity::declared(EntityKind::Class, qualified, self.path.clone())
            .lines(start_line, self.token(close).line)
            .doc_comment(self.pending_doc.take())
            .flavor(flavor);
        entity.parents = parents;
        entity.interfaces = interfaces;
        self.declare(entity)?;
        Ok(close + 1)
    }

    fn skip_anonymous_class(&self, idx: usize) -> usize {
        (idx..self.tokens.len())
            .find(|&cursor| self.token(cursor).is_punct("{"))
            .and_then(|open| self.tokens.matching_bracket(open))
            .map_or(idx + 1, |close| close + 1)
    }

    fn function_declaration(&mut self, idx: usize) -> Result<usize, BuildError> {
        let keyword = self.token(idx);
        let missing = || BuildError::MissingName {
            keyword: "function".to_string(),
            line: keyword.line,
        };

        let mut name_idx = self.next_significant(idx + 1).ok_or_else(missing)?;
        if self.token(name_idx).is_punct("&") {
            name_idx = self.next_significant(name_idx + 1).ok_or_else(missing)?;
        }
        let name = self.token(name_idx);
        if name.is_punct("(") {
            // closure; its body is walked like any other block
            return Ok(idx + 1);
        }
        if name.kind != TokenKind::Name || name.text.contains(NAMESPACE_SEPARATOR) {
            return Err(missing());
        }
        let qualified = self.qualify(&name.text);

        let body = (name_idx + 1..self.tokens.len())
            .map(|cursor| (cursor, self.token(cursor)))
            .find(|(_, t)| t.is_punct("{") || t.is_punct(";"))
            .filter(|(_, t)| t.is_punct("{"))
            .map(|(cursor, _)| cursor)
            .ok_or_else(|| BuildError::MissingBody {
                name: qualified.clone(),
                line: keyword.line,
            })?;
        let close = self
            .tokens
            .matching_bracket(body)
            .ok_or(BuildError::UnbalancedBraces { line: keyword.line })?;

        let entity = Entity::declared(EntityKind::Function, qualified, self.path.clone())
            .lines(keyword.line, self.token(close).line)
            .doc_comment(self.pending_doc.take());
        self.declare(entity)?;
        Ok(close + 1)
    }

    /// `const A = 1, B = 2;`
    fn const_declaration(&mut self, idx: usize) -> Result<usize, BuildError> {
        let keyword = self.token(idx);
        let mut cursor = idx;
        loop {
            let (name_idx, name) = self.expect_name(cursor).map_err(|_| BuildError::MissingName {
                keyword: "const".to_string(),
                line: keyword.line,
            })?;
            let entity = Entity::declared(
                EntityKind::Constant,
                self.qualify(&name.text),
                self.path.clone(),
            )
            .lines(name.line, name.line)
            .doc_comment(self.pending_doc.take());
            self.declare(entity)?;

            let mut depth = 0usize;
            let mut end = name_idx + 1;
            while let Some(token) = self.tokens.get(end) {
                if token.kind == TokenKind::Punct {
                    match token.text.as_str() {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth = depth.saturating_sub(1),
                        "," | ";" if depth == 0 => break,
                        _ => {}
                    }
                }
                end += 1;
            }
            match self.tokens.get(end) {
                Some(token) if token.text == "," => cursor = end,
                Some(_) => return Ok(end + 1),
                None => return Ok(end),
            }
        }
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit(NAMESPACE_SEPARATOR).next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use refbroker_lexer::Lexer;
    use std::path::Path;

    fn build(source: &str) -> Result<SourceUnitReflection, BuildError> {
        let tokens = Lexer::new().tokenize(source).expect("tokenize");
        DeclarationBuilder.build(&SourcePath::from_fs(Path::new("/src/unit.php")), &tokens)
    }

    fn names(unit: &SourceUnitReflection, kind: EntityKind) -> Vec<String> {
        unit.entities_of(kind).map(|e| e.name.clone()).collect()
    }

    #[test]
    fn global_declarations() {
        let unit = build(
            "<?php\nclass A {}\nfunction f() { return 1; }\nconst C = 3, D = [1, 2];\n",
        )
        .expect("build");
        assert_eq!(names(&unit, EntityKind::Class), vec!["A"]);
        assert_eq!(names(&unit, EntityKind::Function), vec!["f"]);
        assert_eq!(names(&unit, EntityKind::Constant), vec!["C", "D"]);
        assert_eq!(names(&unit, EntityKind::Namespace), vec![""]);
    }

    #[test]
    fn statement_namespaces_switch_scope() {
        let unit = build(
            "<?php\nnamespace App\\One;\nclass A {}\nnamespace App\\Two;\nfunction f() {}\n",
        )
        .expect("build");
        assert_eq!(names(&unit, EntityKind::Class), vec!["App\\One\\A"]);
        assert_eq!(names(&unit, EntityKind::Function), vec!["App\\Two\\f"]);
        assert_eq!(
            names(&unit, EntityKind::Namespace),
            vec!["App\\One", "App\\Two"]
        );
    }

    #[test]
    fn braced_namespaces_end_at_their_brace() {
        let unit = build(
            "<?php\nnamespace Lib { class A {} }\nnamespace { function g() {} }\n",
        )
        .expect("build");
        assert_eq!(names(&unit, EntityKind::Class), vec!["Lib\\A"]);
        assert_eq!(names(&unit, EntityKind::Function), vec!["g"]);
        assert_eq!(names(&unit, EntityKind::Namespace), vec!["Lib", ""]);
    }

    #[test]
    fn class_members_are_not_top_level() {
        let unit = build(
            "<?php\nabstract class Service {\n  const VERSION = 2;\n  public function run() {}\n}\n",
        )
        .expect("build");
        assert_eq!(names(&unit, EntityKind::Class), vec!["Service"]);
        assert!(names(&unit, EntityKind::Function).is_empty());
        assert!(names(&unit, EntityKind::Constant).is_empty());
        let class = unit.classes().next().expect("class");
        assert_eq!((class.start_line, class.end_line), (2, 5));
    }

    #[test]
    fn resolves_parents_through_imports() {
        let unit = build(
            "<?php\nnamespace App;\nuse Vendor\\Base as Root, Vendor\\Contracts;\n\
             final class User extends Root implements Contracts\\Named, \\Countable, Local {}\n",
        )
        .expect("build");
        let class = unit.classes().next().expect("class");
        assert_eq!(class.name, "App\\User");
        assert_eq!(class.parents, vec!["Vendor\\Base"]);
        assert_eq!(
            class.interfaces,
            vec!["Vendor\\Contracts\\Named", "Countable", "App\\Local"]
        );
    }

    #[test]
    fn doc_comments_attach_to_next_declaration() {
        let unit = build("<?php\n/** Makes things. */\nfunction make() {}\nfunction other() {}\n")
            .expect("build");
        let docs: Vec<Option<String>> = unit
            .functions()
            .map(|f| f.doc_comment.clone())
            .collect();
        assert_eq!(docs, vec![Some("/** Makes things. */".to_string()), None]);
    }

    #[test]
    fn closures_and_class_constants_are_ignored() {
        let unit = build(
            "<?php\n$f = function ($x) use ($y) { return $x; };\n$n = Foo::class;\n\
             $o = new class { public function hidden() {} };\n",
        )
        .expect("build");
        assert!(unit.entities.is_empty(), "got {:?}", unit.entities);
    }

    #[test]
    fn interfaces_and_traits_are_classes() {
        let unit = build("<?php\ninterface I extends A, B {}\ntrait T {}\n").expect("build");
        let flavors: Vec<_> = unit.classes().map(|c| c.flavor).collect();
        assert_eq!(
            flavors,
            vec![Some(ClassFlavor::Interface), Some(ClassFlavor::Trait)]
        );
        assert_eq!(unit.classes().next().map(|c| c.parents.len()), Some(2));
    }

    #[test]
    fn unbalanced_braces_fail() {
        let err = build("<?php\nclass A {\n  function f() {\n}\n").expect_err("unbalanced");
        assert_eq!(err, BuildError::UnbalancedBraces { line: 2 });

        let err = build("<?php\n}\n").expect_err("stray close");
        assert_eq!(err, BuildError::UnbalancedBraces { line: 2 });
    }

    #[test]
    fn duplicate_declarations_fail() {
        let err = build("<?php\nfunction f() {}\nfunction f() {}\n").expect_err("duplicate");
        assert_eq!(
            err,
            BuildError::DuplicateDeclaration {
                kind: EntityKind::Function,
                name: "f".to_string(),
                line: 3,
            }
        );
    }

    #[test]
    fn nested_namespace_fails() {
        let err = build("<?php\nnamespace A {\n  namespace B;\n}\n").expect_err("nested");
        assert_eq!(err, BuildError::NestedNamespace { line: 3 });
    }

    #[test]
    fn nameless_class_fails() {
        let err = build("<?php\nclass {}\n").expect_err("nameless");
        assert_eq!(
            err,
            BuildError::MissingName {
                keyword: "class".to_string(),
                line: 2,
            }
        );
    }
}
