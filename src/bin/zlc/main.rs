use std::{fs, path::Path};

use anyhow::{bail, Context};
use clap::Parser;
use log::{debug, trace, LevelFilter};
use zlang::{
    codegen,
    ir::interp,
    lexer::{self, SUGGESTED_TOKENS_CAPACITY},
    parser,
    util::fmt::tree,
};

use crate::args::{Args, Emit};

mod args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level_filter());
    trace!("starting zlc with args: {args:?}");

    let src = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read `{}`", args.file.display()))?;
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);

    if args.emits(Emit::Tokens) {
        lexer::lex(&src, &mut tokens);
        for token in &tokens {
            println!("{token:?} {:?}", token.text(&src));
        }
        tokens.clear();
    }

    let program = match parser::parse_program(&src, &mut tokens) {
        Ok(program) => program,
        Err((_, errors)) => {
            for error in &errors {
                eprintln!("{}:{error:#}", args.file.display());
            }
            bail!("could not parse `{}`", args.file.display());
        }
    };
    debug!("parsed {} definitions", program.definitions.len());
    if args.emits(Emit::Ast) {
        print!("{}", tree::print_program_string(&program));
    }

    let module = match codegen::lower_program(module_name(&args.file), &program) {
        Ok(module) => module,
        Err((_, error)) => {
            eprintln!("{}:{error:#}", args.file.display());
            bail!("could not compile `{}`", args.file.display());
        }
    };
    if args.emits(Emit::Ir) {
        print!("{module}");
    }

    if let Some(function) = &args.call {
        let result = interp::call(&module, function, &args.call_args)
            .with_context(|| format!("failed to evaluate `{function}`"))?;
        println!("{result}");
    }
    Ok(())
}

fn module_name(path: &Path) -> &str {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("main")
}

fn init_logging(level_filter: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level_filter)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}
