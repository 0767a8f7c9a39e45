//! 命令行参数与运行配置.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, ValueEnum};
use flair_berry::consts::{
    DEFAULT_DILATE_RADIUS, DEFAULT_ERODE_RADIUS, DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND,
};
use flair_berry::dataset::generic::volume_files;
use flair_berry::dataset::{MaskEncoding, VolumeFormat};
use flair_berry::morph::{Connectivity, StructElem};
use flair_berry::IntensityWindow;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use utils::loader;

/// 基于强度窗口与形态学精化的 FLAIR MRI 批量脑提取.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// FLAIR 扫描目录. 缺省时依次使用 `$FLAIR_SOURCE_DIR` 与 `$HOME/dataset/flair/volume`.
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// 脑掩膜输出目录. 缺省时依次使用 `$FLAIR_OUTPUT_DIR` 与 `$HOME/dataset/flair/mask`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 真值掩膜目录, 文件名与扫描文件一致.
    ///
    /// 缺省时从扫描文件自身的 `gt` 字段读取真值, 这只适用于全部为 npz 的扫描目录;
    /// 扫描目录中有其它格式的文件时必须给出该参数.
    #[arg(short, long)]
    pub truth: Option<PathBuf>,

    /// 提取完成后以真值验证输出掩膜.
    #[arg(long)]
    pub validate: bool,

    /// 跳过提取, 只验证输出目录中已有的掩膜.
    #[arg(long, conflicts_with = "validate")]
    pub validate_only: bool,

    /// 强度窗口下限 (含).
    #[arg(long, default_value_t = DEFAULT_LOWER_BOUND)]
    pub lower: f32,

    /// 强度窗口上限 (含).
    #[arg(long, default_value_t = DEFAULT_UPPER_BOUND)]
    pub upper: f32,

    /// 腐蚀结构元半径.
    #[arg(long, default_value_t = DEFAULT_ERODE_RADIUS)]
    pub erode_radius: usize,

    /// 膨胀结构元半径.
    #[arg(long, default_value_t = DEFAULT_DILATE_RADIUS)]
    pub dilate_radius: usize,

    /// 输出掩膜中脑组织写为 255 而不是 1.
    #[arg(long)]
    pub ubyte: bool,

    /// 使用半径 + 0.5 的圆盘结构元.
    #[arg(long)]
    pub relaxed_disk: bool,

    /// 三维连通域的邻接规则.
    #[arg(long, value_enum, default_value_t = Neighbourhood::Full)]
    pub connectivity: Neighbourhood,

    /// 单个体数据失败时记录并跳过, 而不是中止.
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// 将每个输出掩膜的中间水平切片保存为 PNG 到该目录.
    #[arg(long)]
    pub preview_dir: Option<PathBuf>,

    /// 并行线程数. 缺省为可用核心数.
    #[arg(short = 'j', long, env = "FLAIR_THREADS")]
    pub threads: Option<usize>,

    /// 日志详细程度, 可重复 (`-v` 为 debug, `-vv` 为 trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// 由 `-v` 个数决定的日志等级.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// 命令行层面的连通规则.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Neighbourhood {
    /// 6-邻域.
    Face,
    /// 18-邻域.
    Edge,
    /// 26-邻域.
    Full,
}

impl From<Neighbourhood> for Connectivity {
    fn from(n: Neighbourhood) -> Self {
        match n {
            Neighbourhood::Face => Connectivity::Face,
            Neighbourhood::Edge => Connectivity::Edge,
            Neighbourhood::Full => Connectivity::Full,
        }
    }
}

/// 运行阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// 只提取.
    Extract,
    /// 提取后验证.
    ExtractAndValidate,
    /// 只验证.
    ValidateOnly,
}

impl Mode {
    /// 是否需要提取.
    #[inline]
    pub fn extracts(&self) -> bool {
        !matches!(self, Mode::ValidateOnly)
    }

    /// 是否需要验证.
    #[inline]
    pub fn validates(&self) -> bool {
        !matches!(self, Mode::Extract)
    }
}

/// 经过检查的运行配置. 启动时构建一次, 之后只读.
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub truth_dir: PathBuf,
    pub mode: Mode,
    pub window: IntensityWindow,
    pub eroder: StructElem,
    pub dilater: StructElem,
    pub connectivity: Connectivity,
    pub keep_going: bool,
    pub preview_dir: Option<PathBuf>,
    pub encoding: MaskEncoding,
}

impl ExtractConfig {
    /// 从命令行参数构建配置, 并检查目录与参数的合法性.
    pub fn from_args(args: &Args) -> anyhow::Result<Self> {
        let source_dir = match &args.source {
            Some(d) => d.clone(),
            None => loader::source_dir_from_env_or_home()
                .context("cannot determine the source directory")?,
        };
        let output_dir = match &args.output {
            Some(d) => d.clone(),
            None => loader::output_dir_from_env_or_home()
                .context("cannot determine the output directory")?,
        };

        let mode = match (args.validate, args.validate_only) {
            (_, true) => Mode::ValidateOnly,
            (true, false) => Mode::ExtractAndValidate,
            (false, false) => Mode::Extract,
        };

        if mode.extracts() && !source_dir.is_dir() {
            bail!("source directory `{}` does not exist", source_dir.display());
        }
        if mode == Mode::ValidateOnly && !output_dir.is_dir() {
            bail!("output directory `{}` does not exist", output_dir.display());
        }
        let truth_dir = match &args.truth {
            Some(d) => d.clone(),
            None if mode.validates() => {
                truth_beside_scans(&source_dir)?;
                source_dir.clone()
            }
            None => source_dir.clone(),
        };
        if mode.validates() && !truth_dir.is_dir() {
            bail!("truth directory `{}` does not exist", truth_dir.display());
        }

        let window = IntensityWindow::new(args.lower, args.upper).with_context(|| {
            format!("invalid intensity window [{}, {}]", args.lower, args.upper)
        })?;

        let disk: fn(usize) -> StructElem = if args.relaxed_disk {
            StructElem::disk_relaxed
        } else {
            StructElem::disk
        };

        Ok(Self {
            source_dir,
            output_dir,
            truth_dir,
            mode,
            window,
            eroder: disk(args.erode_radius),
            dilater: disk(args.dilate_radius),
            connectivity: args.connectivity.into(),
            keep_going: args.keep_going,
            preview_dir: args.preview_dir.clone(),
            encoding: if args.ubyte {
                MaskEncoding::Ubyte
            } else {
                MaskEncoding::Binary
            },
        })
    }
}

/// 未给出真值目录时, 真值只能来自扫描目录中 npz 文件的 `gt` 字段.
fn truth_beside_scans(source_dir: &Path) -> anyhow::Result<()> {
    let files = volume_files(source_dir)
        .with_context(|| format!("cannot list source directory `{}`", source_dir.display()))?;
    let foreign = files
        .iter()
        .find(|p| !matches!(VolumeFormat::from_path(p), Ok(VolumeFormat::Npz)));
    if let Some(p) = foreign {
        bail!(
            "`--truth` is required: `{}` is not an npz archive and carries no `gt` field",
            p.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 新建一个空的临时目录.
    fn temp_dir(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("flair-config-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&p);
        std::fs::create_dir_all(&p).unwrap();
        p
    }

    fn parse(dir: &Path, extra: &[&str]) -> Args {
        let dir = dir.to_str().unwrap();
        let mut argv = vec!["extract", "--source", dir, "--output", dir];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let dir = temp_dir("defaults");
        let args = parse(&dir, &[]);
        assert_eq!(args.log_level(), LevelFilter::Info);

        let cfg = ExtractConfig::from_args(&args).unwrap();
        assert_eq!(cfg.mode, Mode::Extract);
        assert_eq!(cfg.window, IntensityWindow::from_flair_default());
        assert_eq!(cfg.eroder, StructElem::disk(4));
        assert_eq!(cfg.dilater, StructElem::disk(6));
        assert_eq!(cfg.connectivity, Connectivity::Full);
        assert_eq!(cfg.encoding, MaskEncoding::Binary);
        assert_eq!(cfg.truth_dir, cfg.source_dir);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_options() {
        let dir = temp_dir("options");
        let args = parse(
            &dir,
            &[
                "--validate-only",
                "--relaxed-disk",
                "--erode-radius",
                "1",
                "--connectivity",
                "face",
                "--ubyte",
                "-vv",
            ],
        );
        assert_eq!(args.log_level(), LevelFilter::Trace);

        let cfg = ExtractConfig::from_args(&args).unwrap();
        assert_eq!(cfg.mode, Mode::ValidateOnly);
        assert!(!cfg.mode.extracts());
        assert_eq!(cfg.eroder.len(), 9);
        assert_eq!(cfg.connectivity, Connectivity::Face);
        assert_eq!(cfg.encoding, MaskEncoding::Ubyte);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_truth_required_for_non_npz_sources() {
        let dir = temp_dir("truth");
        std::fs::write(dir.join("case01.npz"), "archive").unwrap();
        let args = parse(&dir, &["--validate"]);
        assert_eq!(ExtractConfig::from_args(&args).unwrap().truth_dir, dir);

        std::fs::write(dir.join("case02.nii"), "scan").unwrap();
        let err = ExtractConfig::from_args(&args).unwrap_err();
        assert!(err.to_string().contains("--truth"));

        // 只提取时不需要真值.
        assert!(ExtractConfig::from_args(&parse(&dir, &[])).is_ok());

        let truth = dir.to_str().unwrap();
        let args = parse(&dir, &["--validate", "--truth", truth]);
        assert!(ExtractConfig::from_args(&args).is_ok());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_window() {
        let dir = temp_dir("window");
        let args = parse(&dir, &["--lower", "500", "--upper", "100"]);
        assert!(ExtractConfig::from_args(&args).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_source_dir() {
        let args = Args::parse_from(["extract", "--source", "/no/such/flair/dir", "--output", "."]);
        assert!(ExtractConfig::from_args(&args).is_err());
    }
}
