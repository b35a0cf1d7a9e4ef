//! Tokenizer for the solution language (a small JavaScript subset).

use super::ScriptError;

#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
  Num(f64),
  Str(String),
  Ident(String),
  Punct(&'static str),
  Eof,
}

#[derive(Clone, Debug)]
pub struct Token {
  pub tok: Tok,
  pub line: usize,
}

// Longest first so that "===" wins over "==" and "=".
const PUNCTS: &[&str] = &[
  "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=", "/=", "%=",
  "+", "-", "*", "/", "%", "<", ">", "=", "!", "(", ")", "{", "}", "[", "]", ",", ";", ".", ":", "?",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ScriptError> {
  let chars: Vec<char> = src.chars().collect();
  let mut out = Vec::new();
  let mut i = 0;
  let mut line = 1;

  while i < chars.len() {
    let c = chars[i];

    if c == '\n' {
      line += 1;
      i += 1;
      continue;
    }
    if c.is_whitespace() {
      i += 1;
      continue;
    }

    // Comments
    if c == '/' && chars.get(i + 1) == Some(&'/') {
      while i < chars.len() && chars[i] != '\n' { i += 1; }
      continue;
    }
    if c == '/' && chars.get(i + 1) == Some(&'*') {
      i += 2;
      loop {
        if i + 1 >= chars.len() {
          return Err(ScriptError::syntax("unterminated comment", line));
        }
        if chars[i] == '*' && chars[i + 1] == '/' { i += 2; break; }
        if chars[i] == '\n' { line += 1; }
        i += 1;
      }
      continue;
    }

    if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).map_or(false, |d| d.is_ascii_digit())) {
      let start = i;
      while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') { i += 1; }
      if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        i += 1;
        if i < chars.len() && (chars[i] == '+' || chars[i] == '-') { i += 1; }
        while i < chars.len() && chars[i].is_ascii_digit() { i += 1; }
      }
      let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
      let n = text
        .parse::<f64>()
        .map_err(|_| ScriptError::syntax(format!("invalid number '{}'", text), line))?;
      out.push(Token { tok: Tok::Num(n), line });
      continue;
    }

    if c == '"' || c == '\'' {
      let quote = c;
      i += 1;
      let mut s = String::new();
      loop {
        let Some(&ch) = chars.get(i) else {
          return Err(ScriptError::syntax("unterminated string literal", line));
        };
        i += 1;
        if ch == quote { break; }
        if ch == '\n' {
          return Err(ScriptError::syntax("unterminated string literal", line));
        }
        if ch == '\\' {
          let Some(&esc) = chars.get(i) else {
            return Err(ScriptError::syntax("unterminated string literal", line));
          };
          i += 1;
          s.push(match esc {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            other => other,
          });
        } else {
          s.push(ch);
        }
      }
      out.push(Token { tok: Tok::Str(s), line });
      continue;
    }

    if c.is_alphabetic() || c == '_' || c == '$' {
      let start = i;
      while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') { i += 1; }
      out.push(Token { tok: Tok::Ident(chars[start..i].iter().collect()), line });
      continue;
    }

    let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
    match PUNCTS.iter().find(|p| rest.starts_with(**p)) {
      Some(p) => {
        out.push(Token { tok: Tok::Punct(p), line });
        i += p.len();
      }
      None => return Err(ScriptError::syntax(format!("unexpected character '{}'", c), line)),
    }
  }

  out.push(Token { tok: Tok::Eof, line });
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn toks(src: &str) -> Vec<Tok> {
    tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
  }

  #[test]
  fn splits_operators_longest_first() {
    assert_eq!(
      toks("a === b !== c => d"),
      vec![
        Tok::Ident("a".into()), Tok::Punct("==="), Tok::Ident("b".into()), Tok::Punct("!=="),
        Tok::Ident("c".into()), Tok::Punct("=>"), Tok::Ident("d".into()), Tok::Eof,
      ]
    );
  }

  #[test]
  fn skips_comments_and_tracks_lines() {
    let t = tokenize("// head\n/* block\n */ x").unwrap();
    assert_eq!(t[0].tok, Tok::Ident("x".into()));
    assert_eq!(t[0].line, 3);
  }

  #[test]
  fn reads_string_escapes_and_numbers() {
    assert_eq!(toks(r#"'a\'b' "x\ny" 1.5e2 .5"#), vec![
      Tok::Str("a'b".into()), Tok::Str("x\ny".into()), Tok::Num(150.0), Tok::Num(0.5), Tok::Eof,
    ]);
  }

  #[test]
  fn rejects_unterminated_string() {
    let err = tokenize("let s = 'oops").unwrap_err();
    assert!(err.to_string().contains("unterminated string"));
  }
}
