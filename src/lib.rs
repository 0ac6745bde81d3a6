/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// Code generation walks an AST, lowering each function definition into the
/// IR module.
pub mod codegen;

pub mod ast;
pub mod ir;
pub mod token;

pub mod util {
    pub mod fmt {
        pub mod tree;
    }
    #[cfg(test)]
    pub(crate) mod test_utils;
}
