mod frontend;
mod midend;

use std::fs;
use std::io::{self, Write};
use std::process;

use tracing_subscriber::EnvFilter;

use crate::frontend::ast::AstPrinter;
use crate::frontend::parser::Parser;
use crate::midend::emit::Emitter;

fn usage() {
    eprintln!("usage: uscc <source> [-O] [-emit-ast] [-emit-ir] [-emit-bc <file>]");
}

struct Options {
    source: String,
    optimize: bool,
    emit_ast: bool,
    emit_ir: bool,
    emit_bc: Option<String>,
}

fn parse_args(args: &[String]) -> Option<Options> {
    let mut source = None;
    let mut optimize = false;
    let mut emit_ast = false;
    let mut emit_ir = false;
    let mut emit_bc = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-O" => optimize = true,
            "-emit-ast" => emit_ast = true,
            "-emit-ir" => emit_ir = true,
            "-emit-bc" => {
                if i + 1 >= args.len() {
                    eprintln!("uscc: error: -emit-bc requires a file name");
                    return None;
                }
                emit_bc = Some(args[i + 1].clone());
                i += 1;
            }
            s if s.starts_with('-') => {
                eprintln!("uscc: error: unknown option: {}", s);
                return None;
            }
            s => {
                if source.is_some() {
                    eprintln!("uscc: error: multiple input files not supported");
                    return None;
                }
                source = Some(s.to_string());
            }
        }
        i += 1;
    }

    let source = match source {
        Some(source) => source,
        None => return None,
    };
    Some(Options {
        source,
        optimize,
        emit_ast,
        emit_ir,
        emit_bc,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Some(opts) => opts,
        None => {
            usage();
            process::exit(1);
        }
    };

    let source = match fs::read_to_string(&opts.source) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("uscc: error: could not read {}: {}", opts.source, err);
            process::exit(1);
        }
    };

    let parser = Parser::new(&opts.source, &source);
    if !parser.is_valid() {
        let stderr = io::stderr();
        let _ = parser.write_errors(&mut stderr.lock());
        process::exit(1);
    }

    if opts.emit_ast {
        let printer = AstPrinter::new(parser.symbols(), parser.strings());
        if let Some(root) = parser.root() {
            print!("{}", printer.dump(root));
        }
    }

    let mut emitter = Emitter::from_parser(parser);
    if opts.optimize {
        emitter.optimize();
    }

    if opts.emit_ir {
        let stdout = io::stdout();
        if let Err(err) = emitter.print(&mut stdout.lock()) {
            eprintln!("uscc: error: could not write IR: {}", err);
            process::exit(1);
        }
    }

    if let Some(path) = opts.emit_bc {
        let result = fs::File::create(&path)
            .and_then(|mut file| emitter.write_bitcode(&mut file).and_then(|_| file.flush()));
        if let Err(err) = result {
            eprintln!("uscc: error: could not write {}: {}", path, err);
            process::exit(1);
        }
    }
}
