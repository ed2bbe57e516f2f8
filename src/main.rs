//! lesson-forge – command-line lesson → PDF exporter.
//!
//! Usage:
//!   lesson-forge <lesson.json> [--out-dir DIR] [--config FILE] [--font FILE.ttf]
//!                [--high-quality] [--share-cmd PROGRAM] [--plan-only]
//!
//! The PDF is named after the lesson title and written to `--out-dir`
//! (default: the current directory).

use std::{env, fs, path::PathBuf, process};

use lesson_forge::config::{ExportConfig, ExportQuality};
use lesson_forge::delivery::{CommandShare, Delivery};
use lesson_forge::fonts::{FontManager, DEFAULT_FAMILY};
use lesson_forge::lesson::LessonDocument;
use lesson_forge::pipeline::Exporter;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut out_dir = PathBuf::from(".");
    let mut config_path: Option<PathBuf> = None;
    let mut font_path: Option<PathBuf> = None;
    let mut high_quality = false;
    let mut share_cmd: Option<String> = None;
    let mut plan_only = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--out-dir" | "-o" => out_dir = PathBuf::from(flag_value(&mut iter, arg, &args[0])),
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0])))
            }
            "--font" | "-f" => font_path = Some(PathBuf::from(flag_value(&mut iter, arg, &args[0]))),
            "--share-cmd" => share_cmd = Some(flag_value(&mut iter, arg, &args[0])),
            "--high-quality" => high_quality = true,
            "--plan-only" => plan_only = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if input_path.is_some() {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                input_path = Some(PathBuf::from(path));
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no lesson file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let lesson = LessonDocument::load(&input).unwrap_or_else(|e| fail(e));

    let mut config = match &config_path {
        Some(path) => ExportConfig::load(path).unwrap_or_else(|e| fail(e)),
        None => ExportConfig::default(),
    };
    if high_quality {
        config.quality = ExportQuality::High;
    }

    let mut fonts = FontManager::new();
    if let Some(path) = &font_path {
        let bytes = fs::read(path).unwrap_or_else(|e| {
            fail(format!("Error reading font '{}': {e}", path.display()))
        });
        if let Err(e) = fonts.load_font(DEFAULT_FAMILY, false, bytes) {
            fail(e);
        }
    }
    fonts.ensure_default();

    let exporter = Exporter::new(config, &fonts).unwrap_or_else(|e| fail(e));

    if plan_only {
        let report = exporter.plan(&lesson).unwrap_or_else(|e| fail(e));
        println!("{}", report.to_json());
        return;
    }

    let mut delivery = Delivery::local(out_dir);
    if let Some(program) = share_cmd {
        delivery = delivery.with_share(Box::new(CommandShare { program }));
    }

    match exporter.export(&lesson, &delivery) {
        Ok(report) => {
            let pages = report.page_count();
            let path = report
                .delivered
                .as_ref()
                .map(|d| d.path().display().to_string())
                .unwrap_or_default();
            eprintln!(
                "Wrote '{}' ({} page{})",
                path,
                pages,
                if pages == 1 { "" } else { "s" }
            );
        }
        Err(e) => fail(format!("Error exporting lesson: {e}")),
    }
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str, prog: &str) -> String {
    match iter.next() {
        Some(v) => v.clone(),
        None => {
            eprintln!("Missing value for {flag}");
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    process::exit(1);
}

fn print_usage(prog: &str) {
    eprintln!("lesson-forge – medical lesson to PDF exporter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <lesson.json> [--out-dir DIR] [--config FILE] [--font FILE.ttf]");
    eprintln!("        [--high-quality] [--share-cmd PROGRAM] [--plan-only]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <lesson.json>     Lesson document (title + five sections)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --out-dir, -o     Directory for the PDF (default: current directory)");
    eprintln!("  --config, -c      Export config JSON (page height, scale, quality, ...)");
    eprintln!("  --font, -f        TTF font used for text (default: greeked placeholder text)");
    eprintln!("  --high-quality    JPEG quality 0.95 instead of 0.85");
    eprintln!("  --share-cmd       Program run as `PROGRAM <file> <caption>` to share the PDF");
    eprintln!("  --plan-only       Print block margins and page placements as JSON");
    eprintln!("  --help            Print this message");
}
