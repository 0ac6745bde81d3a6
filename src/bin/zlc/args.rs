//! Command line arguments of `zlc`.

use std::path::PathBuf;

use clap::{value_parser, ArgAction};
use log::LevelFilter;

#[derive(Debug, clap::Parser)]
#[clap(author, version, about = "Compiles zlang source files into IR")]
pub struct Args {
    /// Source file to compile
    #[clap(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,
    /// Arguments passed to the function given with `--call`
    #[clap(value_name = "ARGS", allow_negative_numbers = true)]
    pub call_args: Vec<i32>,
    /// Stages to print. May be repeated.
    ///
    /// Defaults to `ir` unless `--call` is given.
    #[clap(long, value_enum)]
    emit: Vec<Emit>,
    /// Evaluates the named function of the lowered module and prints its
    /// result
    #[clap(long, value_name = "FUNCTION")]
    pub call: Option<String>,

    #[clap(short = 'v', value_parser = value_parser!(u8).range(0..=2), action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    #[clap(short = 'q', value_parser = value_parser!(u8).range(0..=2), action = ArgAction::Count, conflicts_with = "verbose")]
    quiet: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum Emit {
    Tokens,
    Ast,
    Ir,
}

impl Args {
    /// Whether the given stage should be printed.
    pub fn emits(&self, stage: Emit) -> bool {
        if self.emit.is_empty() {
            return stage == Emit::Ir && self.call.is_none();
        }
        self.emit.contains(&stage)
    }

    /// Gets the logging level based on whether `-v[v]` or `-q[q]` has been
    /// used.
    pub fn log_level_filter(&self) -> LevelFilter {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            i16::MIN..=-2 => LevelFilter::Off,
            -1 => LevelFilter::Error,
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    fn parse(test: &str) -> Args {
        Args::try_parse_from(test.split(' ')).expect("could not parse test string")
    }

    #[test]
    fn test_args_parsing() {
        let args = parse("zlc file.z");
        assert_eq!(args.file, Path::new("file.z"));
        assert!(args.call.is_none());
        assert!(args.call_args.is_empty());
        assert_eq!(args.log_level_filter(), LevelFilter::Info);
    }

    #[test]
    fn test_default_emit_is_ir() {
        let args = parse("zlc file.z");
        assert!(args.emits(Emit::Ir));
        assert!(!args.emits(Emit::Ast));
        assert!(!args.emits(Emit::Tokens));
    }

    #[test]
    fn test_repeated_emit() {
        let args = parse("zlc file.z --emit tokens --emit ast");
        assert!(args.emits(Emit::Tokens));
        assert!(args.emits(Emit::Ast));
        assert!(!args.emits(Emit::Ir));
    }

    #[test]
    fn test_call_with_arguments() {
        let args = parse("zlc file.z --call add 3 -4");
        assert_eq!(args.call.as_deref(), Some("add"));
        assert_eq!(args.call_args, [3, -4]);
        assert!(!args.emits(Emit::Ir));
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse("zlc -v file.z").log_level_filter(), LevelFilter::Debug);
        assert_eq!(parse("zlc -vv file.z").log_level_filter(), LevelFilter::Trace);
        assert_eq!(parse("zlc -q file.z").log_level_filter(), LevelFilter::Error);
        assert_eq!(parse("zlc -qq file.z").log_level_filter(), LevelFilter::Off);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["zlc", "-v", "-q", "file.z"]).is_err());
    }

    #[test]
    fn test_unknown_emit_stage() {
        assert!(Args::try_parse_from(["zlc", "file.z", "--emit", "asm"]).is_err());
    }
}
