//! Spec string parser.
//!
//! ```text
//! specs    := node (ws* '^' ws* node | ws+ node)*
//! node     := [ns '.']* name? modifier*
//! modifier := '@' versions | '+' id | '~' id | '%' id ['@' versions]
//!           | id '=' value           (target=T is the target)
//! ```
//!
//! Modifiers may be glued together (`zlib@1.2+shared%gcc`) or separated by
//! whitespace. A bare identifier after whitespace starts a new spec.

use super::variant::VariantValue;
use super::{AbstractSpec, CompilerSpec, VersionConstraint};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid spec '{input}' at position {position}: {message}")]
pub struct SpecParseError {
  pub input: String,
  pub position: usize,
  pub message: String,
}

impl SpecParseError {
  pub(crate) fn new(input: &str, position: usize, message: impl Into<String>) -> Self {
    SpecParseError {
      input: input.to_string(),
      position,
      message: message.into(),
    }
  }
}

pub(crate) fn parse_specs(input: &str) -> Result<Vec<AbstractSpec>, SpecParseError> {
  let mut parser = Parser { input, pos: 0 };
  let mut specs: Vec<AbstractSpec> = Vec::new();

  loop {
    parser.skip_ws();
    let Some(ch) = parser.peek() else { break };

    if ch == b'^' {
      let caret = parser.pos;
      parser.pos += 1;
      parser.skip_ws();
      let dep = parser.node()?;
      if dep.name.is_none() {
        return Err(parser.error_at(caret, "dependency after '^' must be named"));
      }
      if !dep.dependencies.is_empty() {
        return Err(parser.error_at(caret, "nested dependency constraints are not supported"));
      }
      let Some(parent) = specs.last_mut() else {
        return Err(parser.error_at(caret, "'^' without a preceding spec"));
      };
      if parent.dependencies.iter().any(|d| d.name == dep.name) {
        return Err(parser.error_at(caret, "dependency constrained twice"));
      }
      parent.dependencies.push(dep);
      continue;
    }

    let start = parser.pos;
    let node = parser.node()?;
    if parser.pos == start {
      return Err(parser.error(format!("unexpected character '{}'", ch as char)));
    }
    specs.push(node);
  }

  Ok(specs)
}

struct Parser<'a> {
  input: &'a str,
  pos: usize,
}

fn is_ident_start(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

fn is_ident(b: u8) -> bool {
  is_ident_start(b) || b == b'-'
}

fn is_version_char(b: u8) -> bool {
  b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b':' | b',' | b'=')
}

fn is_value_char(b: u8) -> bool {
  b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b':' | b',' | b'/')
}

impl Parser<'_> {
  fn peek(&self) -> Option<u8> {
    self.input.as_bytes().get(self.pos).copied()
  }

  fn peek_at(&self, offset: usize) -> Option<u8> {
    self.input.as_bytes().get(self.pos + offset).copied()
  }

  fn skip_ws(&mut self) {
    while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
      self.pos += 1;
    }
  }

  fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &str {
    let start = self.pos;
    while self.peek().is_some_and(&pred) {
      self.pos += 1;
    }
    &self.input[start..self.pos]
  }

  fn error(&self, message: impl Into<String>) -> SpecParseError {
    self.error_at(self.pos, message)
  }

  fn error_at(&self, position: usize, message: impl Into<String>) -> SpecParseError {
    SpecParseError::new(self.input, position, message)
  }

  /// Length of an identifier starting at the cursor, if one starts here.
  fn ident_len_ahead(&self) -> usize {
    let bytes = &self.input.as_bytes()[self.pos..];
    match bytes.first() {
      Some(&b) if is_ident_start(b) => bytes.iter().take_while(|&&b| is_ident(b)).count(),
      _ => 0,
    }
  }

  /// True if the cursor sits on `key=`.
  fn at_assignment(&self) -> bool {
    let len = self.ident_len_ahead();
    len > 0 && self.peek_at(len) == Some(b'=')
  }

  fn ident(&mut self, what: &str) -> Result<String, SpecParseError> {
    if self.ident_len_ahead() == 0 {
      return Err(self.error(format!("expected {} name", what)));
    }
    Ok(self.take_while(is_ident).to_string())
  }

  fn versions(&mut self) -> Result<VersionConstraint, SpecParseError> {
    let start = self.pos;
    let raw = self.take_while(is_version_char);
    if raw.is_empty() {
      return Err(self.error("expected version after '@'"));
    }
    VersionConstraint::parse(raw).map_err(|e| self.error_at(start, e.to_string()))
  }

  fn node(&mut self) -> Result<AbstractSpec, SpecParseError> {
    let mut spec = AbstractSpec::default();

    if self.ident_len_ahead() > 0 && !self.at_assignment() {
      let dotted = self.take_while(|b| is_ident(b) || b == b'.').to_string();
      match dotted.rsplit_once('.') {
        Some((ns, name)) => {
          if ns.is_empty() || name.is_empty() || ns.split('.').any(str::is_empty) {
            return Err(self.error(format!("malformed namespaced name '{}'", dotted)));
          }
          spec.namespace = Some(ns.to_string());
          spec.name = Some(name.to_string());
        }
        None => spec.name = Some(dotted),
      }
    }

    loop {
      let Some(ch) = self.peek() else { break };
      match ch {
        b'@' => {
          if !spec.versions.is_any() {
            return Err(self.error("version specified twice"));
          }
          self.pos += 1;
          spec.versions = self.versions()?;
        }
        b'+' | b'~' => {
          let at = self.pos;
          self.pos += 1;
          let name = self.ident("variant")?;
          if spec.variants.insert(name, VariantValue::Bool(ch == b'+')).is_some() {
            return Err(self.error_at(at, "variant specified twice"));
          }
        }
        b'%' => {
          if spec.compiler.is_some() {
            return Err(self.error("compiler specified twice"));
          }
          self.pos += 1;
          let name = self.ident("compiler")?;
          let versions = if self.peek() == Some(b'@') {
            self.pos += 1;
            self.versions()?
          } else {
            VersionConstraint::any()
          };
          spec.compiler = Some(CompilerSpec { name, versions });
        }
        b if is_ident_start(b) && self.at_assignment() => {
          let at = self.pos;
          let key = self.ident("variant")?;
          self.pos += 1;
          let value = self.take_while(is_value_char).to_string();
          if value.is_empty() {
            return Err(self.error(format!("expected value for '{}'", key)));
          }
          if key == "target" {
            if spec.target.replace(value).is_some() {
              return Err(self.error_at(at, "target specified twice"));
            }
          } else if spec.variants.insert(key, VariantValue::from_assignment(&value)).is_some() {
            return Err(self.error_at(at, "variant specified twice"));
          }
        }
        b if b.is_ascii_whitespace() => {
          // Whitespace ends the node unless a modifier follows
          let save = self.pos;
          self.skip_ws();
          let continues = match self.peek() {
            Some(b'@' | b'+' | b'~' | b'%') => true,
            Some(_) => self.at_assignment(),
            None => false,
          };
          if !continues {
            self.pos = save;
            break;
          }
        }
        b'^' => break,
        other => return Err(self.error(format!("unexpected character '{}'", other as char))),
      }
    }

    Ok(spec)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::spec::Version;

  fn parse(s: &str) -> AbstractSpec {
    AbstractSpec::parse(s).unwrap()
  }

  #[test]
  fn name_only() {
    let spec = parse("zlib");
    assert_eq!(spec.name(), Some("zlib"));
    assert!(spec.is_bare());
  }

  #[test]
  fn glued_modifiers() {
    let spec = parse("zlib@1.2:+shared~pic%gcc@12");
    assert_eq!(spec.name(), Some("zlib"));
    assert!(spec.versions().satisfied_by(&Version::parse("1.3").unwrap()));
    assert_eq!(spec.variants()["shared"], VariantValue::Bool(true));
    assert_eq!(spec.variants()["pic"], VariantValue::Bool(false));
    let compiler = spec.compiler().unwrap();
    assert_eq!(compiler.name, "gcc");
    assert!(compiler.versions.satisfied_by(&Version::parse("12.1").unwrap()));
  }

  #[test]
  fn spaced_modifiers_and_dependencies() {
    let spec = parse("builtin.hdf5 @1.14 +mpi api=v18 %clang target=x86_64-linux ^zlib@1.3 ^mpich+fortran");
    assert_eq!(spec.namespace(), Some("builtin"));
    assert_eq!(spec.name(), Some("hdf5"));
    assert_eq!(spec.variants()["api"], VariantValue::Single("v18".into()));
    assert_eq!(spec.target(), Some("x86_64-linux"));
    let deps: Vec<_> = spec.dependencies().iter().filter_map(|d| d.name()).collect();
    assert_eq!(deps, vec!["zlib", "mpich"]);
  }

  #[test]
  fn multi_valued_assignment() {
    let spec = parse("gcc languages=c,cxx,fortran");
    let VariantValue::Multi(values) = &spec.variants()["languages"] else {
      panic!("expected multi value");
    };
    assert_eq!(values.len(), 3);
  }

  #[test]
  fn anonymous_specs() {
    let spec = parse("+shared");
    assert_eq!(spec.name(), None);
    assert_eq!(spec.variants()["shared"], VariantValue::Bool(true));

    let spec = parse("@:1.9");
    assert!(spec.name().is_none());

    let spec = parse("build_type=Debug");
    assert!(spec.name().is_none());
    assert_eq!(spec.variants()["build_type"], VariantValue::Single("Debug".into()));
  }

  #[test]
  fn several_roots() {
    let specs = AbstractSpec::parse_many("zlib@1.3 openssl+shared ^zlib").unwrap();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[1].name(), Some("openssl"));
    assert_eq!(specs[1].dependencies()[0].name(), Some("zlib"));
    assert!(AbstractSpec::parse("zlib openssl").is_err());
  }

  #[test]
  fn display_round_trips() {
    for s in [
      "zlib",
      "zlib@1.2:+shared~pic",
      "builtin.hdf5@1.14+mpi api=v18 %gcc@12: target=x86_64-linux ^zlib@=1.3",
      "+shared",
      "gcc languages=c,fortran",
    ] {
      let spec = parse(s);
      assert_eq!(parse(&spec.to_string()), spec, "round trip of {}", s);
    }
  }

  #[test]
  fn reports_position() {
    let err = AbstractSpec::parse("zlib@1.2 !").unwrap_err();
    assert_eq!(err.position, 9);

    let err = AbstractSpec::parse("zlib@").unwrap_err();
    assert!(err.message.contains("version"));

    assert!(AbstractSpec::parse("^zlib").is_err());
    assert!(AbstractSpec::parse("zlib+").is_err());
    assert!(AbstractSpec::parse("zlib+a+a").is_err());
    assert!(AbstractSpec::parse("zlib@1.0@2.0").is_err());
    assert!(AbstractSpec::parse(".zlib").is_err());
  }
}
