//! 命令行参数

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "entity_enhance")]
#[command(version, about = "Rewrite entity setters so every assignment notifies property listeners", long_about = None)]
pub struct Cli {
    /// 源文件，或包含 .rs 文件的目录
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// 输出文件；输入为目录时为输出目录，保持相对路径
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// YAML 配置文件（setter/getter/持久化方法前缀）
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 只检查并报告，不写出文件
    #[arg(long)]
    pub check: bool,

    /// 输出每个被改写的 setter
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
