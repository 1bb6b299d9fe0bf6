use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use nii_berry::consts::DEFAULT_BINARISE_THRESHOLD;
use nii_berry::prelude::*;
use nii_berry::storage::Variable;
use simple_logger::SimpleLogger;

/// 掩膜内体素的批量堆叠与导出.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输出调试日志.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 将一组 3D 图像在掩膜内的体素堆叠为 `(文件数, 体素数)` 矩阵并导出.
    Stack {
        /// 输入图像.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 掩膜文件. 未给出时从 rcfile 的 `mask` 选项读取.
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// 输出文件, 格式由扩展名决定. 未给出时从 rcfile 的 `output` 选项读取.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 输出矩阵的元素类型.
        #[arg(long, value_enum)]
        dtype: Option<Dtype>,

        /// 读取 rcfile 时使用的应用名.
        #[arg(long, default_value = "berry")]
        app: String,

        /// 额外的配置文件.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// 校验掩膜文件并输出前景体素个数.
    Mask {
        /// 掩膜文件.
        file: PathBuf,

        /// 全零掩膜也视为合法.
        #[arg(long)]
        allow_empty: bool,
    },

    /// 以阈值二值化图像, 保存为掩膜.
    Binarise {
        /// 输入图像.
        file: PathBuf,

        /// 输出的 nifti 文件.
        #[arg(short, long)]
        output: PathBuf,

        /// 体素值大于该阈值即为前景.
        #[arg(short, long, default_value_t = DEFAULT_BINARISE_THRESHOLD)]
        threshold: f64,
    },

    /// 将命令提交到 HTCondor 队列, 失败时在本地执行.
    Submit {
        /// 要执行的命令.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        cmd: Vec<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32,
    F64,
}

/// 命令行参数中给出的选项, 与 rcfile 合并时优先.
fn given_settings(mask: Option<&Path>, output: Option<&Path>, dtype: Option<Dtype>, config: Option<&Path>) -> Settings {
    let mut ans = Settings::new();
    let paths = [("mask", mask), ("output", output), ("config", config)];
    for (key, value) in paths {
        if let Some(p) = value {
            ans.insert(key.to_owned(), p.display().to_string());
        }
    }
    if let Some(d) = dtype {
        let name = if d == Dtype::F32 { "f32" } else { "f64" };
        ans.insert("dtype".to_owned(), name.to_owned());
    }
    ans
}

fn required(settings: &Settings, option: &str, app: &str) -> Result<String> {
    settings.get(option).filter(|v| !v.is_empty()).cloned().ok_or_else(|| Error::OptionNotFound {
        option: option.to_owned(),
        section: format!("stack of {app}rc"),
    })
}

fn stack(files: &[PathBuf], settings: &Settings, app: &str) -> Result<()> {
    let mask = PathBuf::from(required(settings, "mask", app)?);
    let output = PathBuf::from(required(settings, "output", app)?);
    let dtype = match settings.get("dtype").map(String::as_str) {
        None | Some("") => Dtype::F64,
        Some(s) => Dtype::from_str(s, true).map_err(|_| Error::InvalidSetting {
            option: "dtype".to_owned(),
            value: s.to_owned(),
        })?,
    };
    log::info!("Stacking {} files within {} as {dtype:?}.", files.len(), mask.display());

    let (data, indices, shape): (Variable, _, _) = match dtype {
        Dtype::F32 => {
            let (m, idx, shape) = niftilist_mask_to_array::<f32, _, _>(files, &mask)?;
            (m.into(), idx, shape)
        }
        Dtype::F64 => {
            let (m, idx, shape) = niftilist_mask_to_array::<f64, _, _>(files, &mask)?;
            (m.into(), idx, shape)
        }
    };
    log::info!("Data matrix {:?}, {} voxels in mask.", data.shape(), indices.len());

    let mut vars = Variables::new();
    vars.insert("data".to_owned(), data);
    vars.insert("mask_indices".to_owned(), Variable::from_indices(&indices));
    vars.insert("vol_shape".to_owned(), Variable::from_shape(&[shape.0, shape.1, shape.2]));
    match ExportData::save_variables(&output, &vars)? {
        Some(p) => log::info!("Saved to {}.", p.display()),
        None => log::warn!("Nothing saved to {}.", output.display()),
    }
    Ok(())
}

fn binarise_to(file: &Path, output: &Path, threshold: f64) -> Result<()> {
    let (header, _) = get_img_info(file)?;
    let data = binarise(file, threshold)?.mapv(|p| if p { 1.0 } else { 0.0 });
    let count = data.iter().filter(|v| **v != 0.0).count();
    NeuroImage::from_parts(&header, data).save(output)?;
    log::info!("{count} voxels above {threshold} saved to {}.", output.display());
    Ok(())
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Stack {
            files,
            mask,
            output,
            dtype,
            app,
            config,
        } => {
            let given = given_settings(mask.as_deref(), output.as_deref(), dtype, config.as_deref());
            let settings = RcFile::new(app.as_str()).settings(Some("stack"), &given, false)?;
            stack(&files, &settings, &app)
        }
        Command::Mask { file, allow_empty } => {
            let mask = load_mask(&file, allow_empty)?;
            println!("{}: {} of {:?} voxels in mask", file.display(), mask.count(), mask.dim());
            Ok(())
        }
        Command::Binarise {
            file,
            output,
            threshold,
        } => binarise_to(&file, &output, threshold),
        Command::Submit { cmd } => {
            let code = condor_call(&cmd.join(" "))?;
            if code != 0 {
                log::warn!("Command exited with {code}.");
            }
            Ok(())
        }
    }
}

fn main() -> std::result::Result<(), String> {
    let args = Args::parse();
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|e| e.to_string())?;

    run(args).map_err(|e| e.to_string())
}
