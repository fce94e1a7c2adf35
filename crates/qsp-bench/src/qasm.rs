//! Gate counting over OpenQASM 2 / 3 circuit text.
//!
//! Only what a tally needs is understood: register declarations, gate
//! applications (including register broadcast), and the statements that
//! must not be counted (`measure`, `reset`, `barrier`, gate and calibration
//! definitions, classical declarations and assignments). Gate modifiers
//! (`inv @`, `ctrl @`, `pow(k) @`) are folded into the gate they prefix.

use logos::Logos;
use rustc_hash::FxHashMap;

use crate::counts::GateCounts;
use crate::error::{BackendError, BackendResult};

/// Tokens relevant to gate counting.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum Token {
    #[token("OPENQASM")]
    OpenQasm,

    #[token("include")]
    Include,

    #[token("qreg")]
    Qreg,

    #[token("creg")]
    Creg,

    #[token("qubit")]
    Qubit,

    #[token("bit")]
    Bit,

    #[token("gate")]
    Gate,

    #[token("opaque")]
    Opaque,

    #[token("def")]
    Def,

    #[token("measure")]
    Measure,

    #[token("reset")]
    Reset,

    #[token("barrier")]
    Barrier,

    #[token("if")]
    If,

    #[token("cal")]
    Cal,

    #[token("defcal")]
    Defcal,

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    IntLiteral(u64),

    #[regex(r#""[^"]*""#)]
    StringLiteral,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token("->")]
    Arrow,

    #[token("==")]
    EqEq,

    #[token("=")]
    Eq,

    #[token("@")]
    At,

    #[regex(r"[+\-*/^%<>!~&|:.]")]
    Operator,
}

/// Leading keywords of OpenQASM 3 classical statements.
const CLASSICAL_KEYWORDS: &[&str] = &[
    "input", "output", "const", "let", "extern", "return", "bool", "int", "uint", "float",
    "angle", "complex", "duration", "stretch", "array",
];

/// Gate tally and width of a parsed circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSummary {
    /// Gate applications by category.
    pub counts: GateCounts,
    /// Total declared qubits.
    pub num_qubits: u32,
}

/// Tokenize QASM source, failing on the first invalid token.
pub fn tokenize(source: &str) -> BackendResult<Vec<Token>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) => {
                let span = lexer.span();
                return Err(BackendError::Qasm(format!(
                    "invalid token '{}' at position {}",
                    &source[span.clone()],
                    span.start
                )));
            }
        }
    }

    Ok(tokens)
}

/// Count gate applications in a QASM circuit.
pub fn count_gates(source: &str) -> BackendResult<CircuitSummary> {
    let tokens = tokenize(source)?;
    let mut registers: FxHashMap<String, u64> = FxHashMap::default();
    let mut counts = GateCounts::default();
    let mut num_qubits: u64 = 0;
    let mut pos = 0;

    while pos < tokens.len() {
        match &tokens[pos] {
            Token::Gate | Token::Def | Token::Cal | Token::Defcal => {
                pos = skip_block(&tokens, pos)?;
            }
            Token::Qreg | Token::Qubit => {
                let end = statement_end(&tokens, pos)?;
                let (name, size) = register_declaration(&tokens[pos + 1..end])?;
                num_qubits += size;
                registers.insert(name, size);
                pos = end + 1;
            }
            Token::If => {
                // The guarded statement starts right after the condition.
                pos = skip_parens(&tokens, pos + 1)?;
            }
            Token::Identifier(name) => {
                let end = statement_end(&tokens, pos)?;
                let stmt = &tokens[pos..end];
                let is_classical = CLASSICAL_KEYWORDS.contains(&name.as_str())
                    || stmt
                        .iter()
                        .any(|t| matches!(t, Token::Measure | Token::Eq));
                if !is_classical {
                    let (gate, operands) = gate_application(stmt)?;
                    counts.record_n(&gate, broadcast_width(operands, &registers));
                }
                pos = end + 1;
            }
            _ => {
                pos = statement_end(&tokens, pos)? + 1;
            }
        }
    }

    Ok(CircuitSummary {
        counts,
        num_qubits: u32::try_from(num_qubits).unwrap_or(u32::MAX),
    })
}

fn statement_end(tokens: &[Token], start: usize) -> BackendResult<usize> {
    tokens[start..]
        .iter()
        .position(|t| *t == Token::Semicolon)
        .map(|offset| start + offset)
        .ok_or_else(|| BackendError::Qasm("unterminated statement".into()))
}

/// Skip a `gate`/`def` definition, returning the index after its closing brace.
fn skip_block(tokens: &[Token], start: usize) -> BackendResult<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::LBrace => depth += 1,
            Token::RBrace => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| BackendError::Qasm("unbalanced '}'".into()))?;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
    }
    Err(BackendError::Qasm("unterminated gate definition".into()))
}

/// Skip a parenthesized group starting at `start`, returning the index after it.
fn skip_parens(tokens: &[Token], start: usize) -> BackendResult<usize> {
    if tokens.get(start) != Some(&Token::LParen) {
        return Err(BackendError::Qasm("expected '('".into()));
    }
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            _ => {}
        }
    }
    Err(BackendError::Qasm("unterminated condition".into()))
}

/// Effective gate name of a statement and the tokens after it.
///
/// Modifier chains are resolved: `inv @ t` is `tdg`, a single `ctrl @ x`
/// is `cx`, and any other controlled or powered gate counts as `other`.
fn gate_application(stmt: &[Token]) -> BackendResult<(String, &[Token])> {
    let mut pos = 0;
    let mut inverted = false;
    let mut controls = 0usize;
    let mut powered = false;

    loop {
        let Some(Token::Identifier(name)) = stmt.get(pos) else {
            return Err(BackendError::Qasm("expected gate name".into()));
        };
        let after_args = match stmt.get(pos + 1) {
            Some(Token::LParen) => skip_parens(stmt, pos + 1)?,
            _ => pos + 1,
        };
        if stmt.get(after_args) != Some(&Token::At) {
            let gate = match (name.as_str(), inverted, controls, powered) {
                (base, false, 0, false) => base.to_string(),
                (base, true, 0, false) => inverse_name(base).to_string(),
                ("x", false, 1, false) => "cx".to_string(),
                _ => "other".to_string(),
            };
            return Ok((gate, &stmt[pos + 1..]));
        }
        match name.as_str() {
            "inv" => inverted = !inverted,
            "ctrl" | "negctrl" => controls += 1 + usize::from(after_args != pos + 1),
            "pow" => powered = true,
            other => {
                return Err(BackendError::Qasm(format!("unknown gate modifier '{other}'")));
            }
        }
        pos = after_args + 1;
    }
}

fn inverse_name(gate: &str) -> &str {
    match gate {
        "t" => "tdg",
        "tdg" => "t",
        "s" => "sdg",
        "sdg" => "s",
        other => other,
    }
}

/// Name and size of `qreg q[n]`, `qubit[n] q` or `qubit q`.
fn register_declaration(tokens: &[Token]) -> BackendResult<(String, u64)> {
    let name = tokens.iter().find_map(|t| match t {
        Token::Identifier(s) => Some(s.clone()),
        _ => None,
    });
    let size = tokens.iter().find_map(|t| match t {
        Token::IntLiteral(v) => Some(*v),
        _ => None,
    });
    let name = name.ok_or_else(|| BackendError::Qasm("register without a name".into()))?;
    Ok((name, size.unwrap_or(1)))
}

/// Number of applications a gate statement expands to.
///
/// A bare register operand (`h q;`) applies the gate to every qubit of it.
fn broadcast_width(operands: &[Token], registers: &FxHashMap<String, u64>) -> u64 {
    let operands = match operands.first() {
        Some(Token::LParen) => {
            let mut depth = 0usize;
            let mut split = operands.len();
            for (i, token) in operands.iter().enumerate() {
                match token {
                    Token::LParen => depth += 1,
                    Token::RParen => {
                        depth -= 1;
                        if depth == 0 {
                            split = i + 1;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            &operands[split..]
        }
        _ => operands,
    };

    let mut width = 1;
    for (i, token) in operands.iter().enumerate() {
        if let Token::Identifier(name) = token {
            if operands.get(i + 1) != Some(&Token::LBracket) {
                width = width.max(registers.get(name).copied().unwrap_or(1));
            }
        }
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    const QASM2: &str = r#"
OPENQASM 2.0;
include "qelib1.inc";
qreg q[3];
creg c[3];
gate mygate a, b { cx a, b; t b; }
h q[0];
t q[0];
tdg q[1];
cx q[0], q[1];
s q[2];
sdg q[2];
x q;
ry(0.25) q[1];
barrier q;
if (c == 1) z q[0];
measure q -> c;
"#;

    #[test]
    fn test_count_qasm2() {
        let summary = count_gates(QASM2).unwrap();
        let c = summary.counts;
        assert_eq!(summary.num_qubits, 3);
        assert_eq!(c.h, 1);
        assert_eq!(c.t_count(), 2);
        assert_eq!(c.cx, 1);
        assert_eq!(c.s_family(), 2);
        assert_eq!(c.x, 3, "bare register broadcasts to every qubit");
        assert_eq!(c.z, 1, "if-guarded gate is counted");
        assert_eq!(c.other, 1);
        assert_eq!(c.total(), 11);
    }

    #[test]
    fn test_count_qasm3() {
        let source = r#"
OPENQASM 3.0;
qubit[2] q;
qubit anc;
bit[2] c;
t q[0];
cx q[0], anc;
c = measure q;
"#;
        let summary = count_gates(source).unwrap();
        assert_eq!(summary.num_qubits, 3);
        assert_eq!(summary.counts.t, 1);
        assert_eq!(summary.counts.cx, 1);
        assert_eq!(summary.counts.total(), 2);
    }

    #[test]
    fn test_gate_modifiers() {
        let source = r#"
OPENQASM 3.0;
qubit[2] q;
inv @ t q[0];
inv @ s q[1];
ctrl @ x q[0], q[1];
ctrl(2) @ x q[0], q[1], q[1];
pow(2) @ t q[0];
inv @ inv @ h q;
"#;
        let c = count_gates(source).unwrap().counts;
        assert_eq!(c.tdg, 1);
        assert_eq!(c.sdg, 1);
        assert_eq!(c.cx, 1);
        assert_eq!(c.h, 2);
        assert_eq!(c.other, 2);
        assert_eq!(c.total(), 7);
    }

    #[test]
    fn test_classical_declarations_are_not_gates() {
        let source = r#"
OPENQASM 3.0;
input float[64] theta;
float[64] x;
const int n = 2;
qubit[1] q;
cal { }
rz(theta) q[0];
"#;
        let summary = count_gates(source).unwrap();
        assert_eq!(summary.num_qubits, 1);
        assert_eq!(summary.counts.other, 1);
        assert_eq!(summary.counts.total(), 1);
    }

    #[test]
    fn test_unknown_modifier() {
        assert!(count_gates("qubit q;
foo @ x q;").is_err());
    }

    #[test]
    fn test_empty_circuit() {
        let summary = count_gates("OPENQASM 2.0;\nqreg q[4];\n").unwrap();
        assert_eq!(summary.num_qubits, 4);
        assert_eq!(summary.counts.total(), 0);
    }

    #[test]
    fn test_invalid_token() {
        let err = count_gates("qreg q[1];\nh q[0] $;").unwrap_err();
        assert!(matches!(err, BackendError::Qasm(_)));
    }

    #[test]
    fn test_unterminated_statement() {
        assert!(count_gates("qreg q[1];\nh q[0]").is_err());
        assert!(count_gates("gate g a { x a;").is_err());
    }
}
