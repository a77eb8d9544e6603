use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use stitch::bytecode::pool::{
    ClassInfo, ConstantPool, FieldInfo, FieldRefEntry, MethodInfo, MethodRefEntry, PoolEntry,
    Signature,
};
use stitch::bytecode::symbols::Symbol;
use stitch::bytecode::{ops, Kind, Method};
use stitch::jit::sample::sample_catalog;
use stitch::{TargetGenerator, TranslatedMethod, TranslatorOptions};

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Template-based bytecode-to-native translator", long_about = None)]
struct Cli {
    /// Dump the translation result as JSON.
    #[arg(long)]
    json: bool,
    /// TOML file with translator options.
    #[arg(long)]
    options: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = match cli.options {
        Some(path) => match load_options(&path) {
            Ok(options) => options,
            Err(message) => {
                eprintln!("error: {}", message);
                return ExitCode::FAILURE;
            }
        },
        None => TranslatorOptions::default(),
    };

    let catalog = sample_catalog();
    let method = demo_method();
    let generator = TargetGenerator::new(&catalog, options);
    let translated = match generator.translate(&method) {
        Ok(translated) => translated,
        Err(error) => {
            eprintln!("translation failed: {}", error);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&dump_json(&method, &translated)).unwrap()
        );
    } else {
        dump_human(&method, &translated);
    }
    ExitCode::SUCCESS
}

fn load_options(path: &PathBuf) -> Result<TranslatorOptions, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    toml::from_str(&text).map_err(|e| format!("cannot parse {}: {}", path.display(), e))
}

/// A small method exercising the interesting paths: a counted loop with a
/// resolved instance-field read, a direct static call, a backward branch
/// (hence a safepoint), and live reference locals across all of it.
///
/// ```text
///  0: iconst_0
///  1: istore_1
///  2: aload_0
///  3: getfield #1        // int Widget.limit
///  6: istore_2
///  7: iload_1
///  8: iload_2
///  9: if_icmpge 21
/// 12: iinc 1, 1
/// 15: invokestatic #2    // void Widget.tick()
/// 18: goto 7
/// 21: return
/// ```
fn demo_method() -> Method {
    let widget = ClassInfo::new_initialized("demo/Widget");
    let limit = Arc::new(FieldInfo {
        name: Symbol::intern("demo/Widget.limit"),
        holder: widget.clone(),
        kind: Kind::Int,
        offset: 16,
        is_static: false,
    });
    let tick = Arc::new(MethodInfo {
        name: Symbol::intern("demo/Widget.tick"),
        holder: widget,
        signature: Signature::new(vec![], Kind::Void),
        is_static: true,
        is_final: false,
        is_private: false,
        dispatch_index: 0,
    });
    let pool = ConstantPool::new(vec![
        PoolEntry::Integer(0),
        FieldRefEntry::resolved(limit),
        MethodRefEntry::resolved(tick),
    ]);

    let code = vec![
        ops::ICONST_0,
        ops::ISTORE_1,
        ops::ALOAD_0,
        ops::GETFIELD,
        0,
        1,
        ops::ISTORE_2,
        ops::ILOAD_1,
        ops::ILOAD_2,
        ops::IF_ICMPGE,
        0,
        12,
        ops::IINC,
        1,
        1,
        ops::INVOKESTATIC,
        0,
        2,
        ops::GOTO,
        0xff,
        (-11i8) as u8,
        ops::RETURN,
    ];

    Method {
        name: Symbol::intern("demo/Widget.run"),
        code: code.into_boxed_slice(),
        params: vec![Kind::Reference],
        max_locals: 3,
        max_stack: 2,
        exception_handlers: vec![],
        pool,
    }
}

fn dump_human(method: &Method, translated: &TranslatedMethod) {
    println!("method {}", method.name);
    println!(
        "  code: {} bytes from {} bytecodes, {} blocks",
        translated.code_len(),
        method.code.len(),
        translated.block_count
    );
    let stops = &translated.stops;
    println!(
        "  stops: {} ({} direct, {} indirect, {} safepoints)",
        stops.stop_count(),
        stops.direct_call_count(),
        stops.indirect_count,
        stops.safepoint_count
    );
    for i in 0..stops.stop_count() {
        let frame_map = stops.frame_map(i);
        println!(
            "    [{}] pos {} bci {} map {:02x?}",
            i, stops.positions[i], stops.bcis[i], frame_map
        );
    }
    match &translated.reference_literals {
        Some(literals) => {
            println!("  literals: {}", literals.len());
            for literal in literals.iter() {
                println!("    {:?}", literal);
            }
        }
        None => println!("  literals: none"),
    }
    println!("  bci map:");
    for (bci, pos) in translated.bci_to_code.iter().enumerate() {
        if bci < method.code.len() && *pos == 0 {
            continue;
        }
        println!("    {:4} -> {}", bci, pos);
    }
}

fn dump_json(method: &Method, translated: &TranslatedMethod) -> serde_json::Value {
    let stops = &translated.stops;
    let stop_entries: Vec<serde_json::Value> = (0..stops.stop_count())
        .map(|i| {
            serde_json::json!({
                "pos": stops.positions[i],
                "bci": stops.bcis[i],
                "frame_map": stops.frame_map(i),
            })
        })
        .collect();
    serde_json::json!({
        "method": method.name.as_str(),
        "code_len": translated.code_len(),
        "blocks": translated.block_count,
        "bci_to_code": &translated.bci_to_code[..],
        "stops": {
            "direct_calls": stops.direct_call_count(),
            "indirect_calls": stops.indirect_count,
            "safepoints": stops.safepoint_count,
            "entries": stop_entries,
        },
        "literals": translated
            .reference_literals
            .as_ref()
            .map(|l| l.iter().map(|o| format!("{:?}", o)).collect::<Vec<_>>()),
        "catch_ranges": &translated.catch_range_positions[..],
        "catch_blocks": &translated.catch_block_positions[..],
    })
}
