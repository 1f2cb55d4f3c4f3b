//! having - HAVING 表达式的检查、求值与批量过滤工具

use anyhow::{anyhow, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use having_expr::{CompiledExpression, FilterConfig, FilterError, RowFilter};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

type Row = Map<String, Value>;

/// 检查、求值和批量过滤 HAVING 表达式
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 编译表达式并输出规范形式与引用的键
    Check {
        expression: String,
        /// 以 JSON 输出 AST
        #[arg(long)]
        ast: bool,
    },
    /// 对单行 JSON 求值
    Eval {
        expression: String,
        /// 行数据，例如 '{"count(errors)": 12}'
        #[arg(short, long)]
        row: String,
    },
    /// 过滤 JSON Lines 文件，每行一个对象，保留的行输出到 stdout
    Filter {
        expression: String,
        #[arg(short, long)]
        rows: PathBuf,
        /// 过滤配置文件 (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// 交互式求值
    Repl,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Check { expression, ast } => check(&expression, ast),
        Command::Eval { expression, row } => eval(&expression, &row),
        Command::Filter { expression, rows, config } => filter(&expression, &rows, config),
        Command::Repl => repl(),
    }
}

/// 编译表达式，失败时返回带位置标记的错误信息
fn compile(source: &str) -> Result<CompiledExpression> {
    CompiledExpression::compile(source).map_err(|e| anyhow!("{}", e.render(source)))
}

fn parse_row(text: &str) -> Result<Row> {
    serde_json::from_str(text).context("行数据必须是 JSON 对象")
}

fn check(source: &str, show_ast: bool) -> Result<()> {
    let expr = compile(source)?;
    println!("✓ {}", expr.canonical());
    println!("引用的键: {}", expr.referenced_keys().join(", "));
    if show_ast {
        println!("{}", serde_json::to_string_pretty(expr.root())?);
    }
    Ok(())
}

fn eval(source: &str, row: &str) -> Result<()> {
    let expr = compile(source)?;
    let row = parse_row(row)?;
    let keep = expr.evaluate(&row).context("求值失败")?;
    println!("{}", keep);
    Ok(())
}

fn filter(source: &str, rows_path: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let config = match config_path {
        Some(path) => FilterConfig::from_json_file(&path)?,
        None => FilterConfig::default(),
    };
    let row_filter = RowFilter::new(source, config).map_err(|e| match e {
        FilterError::Compile(ce) => anyhow!("{}", ce.render(source)),
        other => other.into(),
    })?;

    let content = fs::read_to_string(rows_path)
        .with_context(|| format!("无法读取行文件 {}", rows_path.display()))?;
    let rows = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_row(line).with_context(|| format!("第 {} 行", n + 1)))
        .collect::<Result<Vec<_>>>()?;

    let total = rows.len();
    let (kept, failures) = row_filter.retain(rows)?;
    for row in &kept {
        println!("{}", serde_json::to_string(row)?);
    }
    for failure in &failures {
        eprintln!("✗ 第 {} 个对象: {}", failure.index + 1, failure.error);
    }
    eprintln!("共 {} 行，保留 {} 行，失败 {} 行", total, kept.len(), failures.len());
    Ok(())
}

const REPL_HELP: &str = "\
输入表达式进行编译；设置了行数据时同时求值。
  :row <JSON>   设置当前行，例如 :row {\"a\": 1}
  :ast          切换 AST 输出
  :help         显示帮助
  :quit         退出";

fn repl() -> Result<()> {
    println!("--- having: HAVING 表达式交互式求值 (:help 查看帮助) ---");
    let mut editor = DefaultEditor::new()?;
    let mut row: Option<Row> = None;
    let mut show_ast = false;

    loop {
        let line = match editor.readline("having> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        editor.add_history_entry(input)?;

        if let Some(rest) = input.strip_prefix(":row") {
            match parse_row(rest.trim()) {
                Ok(parsed) => {
                    println!("✓ 当前行包含 {} 个键", parsed.len());
                    row = Some(parsed);
                }
                Err(e) => println!("✗ {:#}", e),
            }
            continue;
        }

        match input {
            ":quit" | ":q" => break,
            ":help" => println!("{}", REPL_HELP),
            ":ast" => {
                show_ast = !show_ast;
                println!("AST 输出: {}", if show_ast { "开" } else { "关" });
            }
            _ => match CompiledExpression::compile(input) {
                Ok(expr) => {
                    println!("✓ {}", expr.canonical());
                    if show_ast {
                        println!("{}", serde_json::to_string_pretty(expr.root())?);
                    }
                    if let Some(row) = &row {
                        match expr.evaluate(row) {
                            Ok(keep) => println!("=> {}", keep),
                            Err(e) => println!("✗ {}", e),
                        }
                    }
                }
                Err(e) => println!("✗ {}", e.render(input)),
            },
        }
    }
    Ok(())
}
