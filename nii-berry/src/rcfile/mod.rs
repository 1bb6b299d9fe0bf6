//! rcfile 配置: 合并环境变量, ini 配置文件与调用方参数.
//!
//! 优先级从高到低为: 调用方参数, 配置文件 (主机专属 section 优先于普通 section),
//! 环境变量. 合并按键进行, 只有非空值才会覆盖低优先级的值.
//!
//! # 注意
//!
//! 布尔开关不要写成 `True`/`False` 之类的值, 本模块不会解析它们.
//! 推荐的做法是用 `#` 注释掉不需要的开关, 再检查键是否存在.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::consts::rc::{CONFIG_KEY, PATH_KEY};
use crate::error::{Error, Result};

mod config;

pub use config::Config;

/// 键到字符串值的配置表. 每次查询都会重新构建.
pub type Settings = BTreeMap<String, String>;

/// 合并两个配置表. 对每个键, `high` 中的非空值优先, 否则取 `low` 中的值.
pub fn merge(high: &Settings, low: &Settings) -> Settings {
    let mut ans = low.clone();
    for (k, v) in high {
        match ans.get_mut(k) {
            Some(slot) if !v.is_empty() => *slot = v.clone(),
            Some(_) => {}
            None => {
                ans.insert(k.clone(), v.clone());
            }
        }
    }
    ans
}

/// 环境变量前缀: 大写应用名加 `_`.
#[inline]
fn env_prefix(app: &str) -> String {
    format!("{}_", app.to_uppercase())
}

/// 从给定的环境变量中筛选出以 `{APP}_` 开头的变量, 去掉前缀并转为小写.
///
/// 键或值不是合法 UTF-8 的变量被忽略.
pub fn environment_from<I, K, V>(app: &str, vars: I) -> Settings
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let prefix = env_prefix(app);
    vars.into_iter()
        .filter_map(|(k, v)| {
            let k = k.into().into_string().ok()?;
            let v = v.into().into_string().ok()?;
            Some((k.strip_prefix(&prefix)?.to_lowercase(), v))
        })
        .collect()
}

/// 读取当前进程中属于应用 `app` 的环境变量.
pub fn get_environment(app: &str) -> Settings {
    environment_from(app, std::env::vars_os())
}

/// 配置文件的搜索路径, 按读取顺序排列 (后读取的覆盖先读取的):
///
/// 1. `/etc/{app}/config`
/// 2. `/etc/{app}rc`
/// 3. `~/.config/{app}/config`
/// 4. `~/.config/{app}`
/// 5. `~/.{app}/config`
/// 6. `~/.{app}rc`
/// 7. `{app}rc` (当前目录)
/// 8. `.{app}rc` (当前目录)
/// 9. `config_file`
/// 10. `{additional_search_path}/{app}rc`
/// 11. `{additional_search_path}/.{app}rc`
pub fn get_config_filepaths(
    app: &str,
    config_file: Option<&Path>,
    additional_search_path: Option<&Path>,
) -> Vec<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    let rc = format!("{app}rc");
    let dot_rc = format!(".{app}rc");

    let mut ans = vec![
        Path::new("/etc").join(app).join("config"),
        Path::new("/etc").join(&rc),
        home.join(".config").join(app).join("config"),
        home.join(".config").join(app),
        home.join(format!(".{app}")).join("config"),
        home.join(&dot_rc),
        PathBuf::from(&rc),
        PathBuf::from(&dot_rc),
    ];
    if let Some(p) = config_file.filter(|p| !p.as_os_str().is_empty()) {
        ans.push(p.to_owned());
    }
    if let Some(dir) = additional_search_path.filter(|p| !p.as_os_str().is_empty()) {
        ans.push(dir.join(&rc));
        ans.push(dir.join(&dot_rc));
    }
    ans
}

/// 当前主机名.
fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// 展开路径开头的 `~`.
fn expand_user(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

/// 某个应用的 rcfile 配置读取器.
///
/// 默认使用进程环境变量和本机主机名, 也可以为其指定固定值.
///
/// ```no_run
/// use nii_berry::rcfile::RcFile;
///
/// let settings = RcFile::new("berry").settings(Some("stack"), &Default::default(), true);
/// ```
#[derive(Debug, Clone)]
pub struct RcFile {
    app: String,
    config_file: Option<PathBuf>,
    search_path: Option<PathBuf>,
    environment: Option<Settings>,
    hostname: Option<String>,
}

impl RcFile {
    /// 为应用 `app` 创建读取器.
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            config_file: None,
            search_path: None,
            environment: None,
            hostname: None,
        }
    }

    /// 额外读取的配置文件.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 额外的搜索目录. 目录下的 `{app}rc` 与 `.{app}rc` 会被读取.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// 使用固定的环境变量, 而不是进程环境变量. 键为去掉前缀后的小写名.
    pub fn with_environment(mut self, env: Settings) -> Self {
        self.environment = Some(env);
        self
    }

    /// 使用固定的主机名.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// 应用名.
    #[inline]
    pub fn app(&self) -> &str {
        &self.app
    }

    fn environment(&self) -> Settings {
        self.environment
            .clone()
            .unwrap_or_else(|| get_environment(&self.app))
    }

    fn hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(hostname)
    }

    /// 按顺序读取所有存在的配置文件.
    pub fn read_config(&self) -> Result<Config> {
        let files = get_config_filepaths(
            &self.app,
            self.config_file.as_deref(),
            self.search_path.as_deref(),
        );
        let (config, read) = Config::read(&files)?;
        log::debug!("Configuration rcfiles read: {read:?}");
        Ok(config)
    }

    /// 读取配置文件中 `section` 的全部选项. 若存在 `{section}:{主机名}` section,
    /// 其中的非空值优先.
    pub fn get_config(&self, section: &str) -> Result<Settings> {
        let config = self.read_config()?;
        let items = config.items(section)?;

        let host_section = format!("{section}:{}", self.hostname());
        if config.has_section(&host_section) {
            let host_items = config.items(&host_section)?;
            return Ok(merge(&host_items, &items));
        }
        Ok(items)
    }

    /// 所有配置文件中的 section 名.
    pub fn sections(&self) -> Result<Vec<String>> {
        Ok(self.read_config()?.sections())
    }

    /// 合并参数 `args`, 配置文件 section `section` 和环境变量.
    ///
    /// - `section` 为 `None` 时使用应用名;
    /// - `strip_dashes` 为 `true` 时去掉 `args` 键的前导 `-`;
    /// - `args` 中的 `config` 与 `path` 分别指定额外的配置文件与搜索目录.
    ///
    /// 结果为空时返回 `Err(Error::SettingsNotFound)`.
    pub fn settings(&self, section: Option<&str>, args: &Settings, strip_dashes: bool) -> Result<Settings> {
        let args: Settings = if strip_dashes {
            args.iter()
                .map(|(k, v)| (k.trim_start_matches('-').to_owned(), v.clone()))
                .collect()
        } else {
            args.clone()
        };

        let mut reader = self.clone();
        if let Some(p) = args.get(CONFIG_KEY).filter(|p| !p.is_empty()) {
            reader.config_file = Some(PathBuf::from(p));
        }
        if let Some(p) = args.get(PATH_KEY).filter(|p| !p.is_empty()) {
            reader.search_path = Some(PathBuf::from(p));
        }

        let section = section.unwrap_or(&self.app);
        let config = reader.get_config(section)?;
        let ans = merge(&merge(&args, &config), &self.environment());
        if ans.is_empty() {
            log::error!("Could not find any rcfile for application {}.", self.app);
            return Err(Error::SettingsNotFound(self.app.clone()));
        }
        Ok(ans)
    }

    /// 仅由配置文件和环境变量组成的 section 配置.
    pub fn section(&self, section: Option<&str>) -> Result<Settings> {
        self.settings(section, &Settings::new(), true)
    }

    /// 获取 `section` 中变量 `var` 的值. 不存在时返回 `Err(Error::OptionNotFound)`.
    pub fn variable_value(&self, var: &str, section: Option<&str>) -> Result<String> {
        let mut cfg = self.section(section)?;
        cfg.remove(var).ok_or_else(|| Error::OptionNotFound {
            option: var.to_owned(),
            section: section.unwrap_or(&self.app).to_owned(),
        })
    }

    /// 按 section 顺序查找第一个包含变量 `var` 的 section.
    ///
    /// # 返回值
    ///
    /// `(section 名, 变量值)`. 没有任何 section 时返回
    /// `Err(Error::NoSections)`.
    pub fn find_in_sections(&self, var: &str) -> Result<(String, String)> {
        let sections = self.sections()?;
        if sections.is_empty() {
            return Err(Error::NoSections(self.app.clone()));
        }
        for s in sections {
            if let Ok(v) = self.variable_value(var, Some(&s)) {
                return Ok((s, v));
            }
        }
        Err(Error::OptionNotFound {
            option: var.to_owned(),
            section: format!("any {}rc", self.app),
        })
    }

    /// 获取一个存在的路径.
    ///
    /// `rcpath` 本身是存在的路径时直接返回其规范化形式; 否则将其视为
    /// `section` 中的变量名, 取变量值作为路径.
    pub fn sys_path(&self, rcpath: &str, section: Option<&str>) -> Result<PathBuf> {
        let direct = expand_user(rcpath);
        if direct.exists() {
            return Ok(std::fs::canonicalize(direct)?);
        }
        log::debug!(
            "Could not find path {rcpath}, looking for a variable in section {section:?} of {}rc.",
            self.app
        );

        let settings = self.section(section)?;
        let Some(value) = settings.get(rcpath) else {
            log::error!(
                "Could not find an existing variable with name {rcpath} in section {section:?} of {}rc.",
                self.app
            );
            return Err(Error::PathNotFound {
                rcpath: rcpath.to_owned(),
                app: self.app.clone(),
                path: rcpath.to_owned(),
            });
        };

        let path = expand_user(value);
        if !path.exists() {
            log::error!(
                "Could not find the path {} indicated by the variable {rcpath} in section {section:?} of {}rc.",
                path.display(),
                self.app
            );
            return Err(Error::PathNotFound {
                rcpath: rcpath.to_owned(),
                app: self.app.clone(),
                path: path.display().to_string(),
            });
        }
        Ok(std::fs::canonicalize(path)?)
    }
}

/// 读取应用 `app` 的配置文件中 `section` 的选项, 主机专属 section 优先.
pub fn get_config(
    app: &str,
    section: &str,
    config_file: Option<&Path>,
    additional_search_path: Option<&Path>,
) -> Result<Settings> {
    let mut reader = RcFile::new(app);
    reader.config_file = config_file.map(Path::to_owned);
    reader.search_path = additional_search_path.map(Path::to_owned);
    reader.get_config(section)
}

/// 应用 `app` 所有配置文件中的 section 名.
pub fn get_sections(
    app: &str,
    config_file: Option<&Path>,
    additional_search_path: Option<&Path>,
) -> Result<Vec<String>> {
    let mut reader = RcFile::new(app);
    reader.config_file = config_file.map(Path::to_owned);
    reader.search_path = additional_search_path.map(Path::to_owned);
    reader.sections()
}

/// 合并命令行参数 `args`, 配置文件与环境变量. 参见 [`RcFile::settings`].
pub fn rcfile(app: &str, section: Option<&str>, args: &Settings, strip_dashes: bool) -> Result<Settings> {
    RcFile::new(app).settings(section, args, strip_dashes)
}

/// 获取应用 `app` 的 section 配置. 参见 [`RcFile::section`].
pub fn get_rcfile_section(app: &str, section: Option<&str>) -> Result<Settings> {
    RcFile::new(app).section(section)
}

/// 获取应用 `app` 中 `section` 的变量值. 参见 [`RcFile::variable_value`].
pub fn get_rcfile_variable_value(var: &str, app: &str, section: Option<&str>) -> Result<String> {
    RcFile::new(app).variable_value(var, section)
}

/// 查找第一个包含变量 `var` 的 section. 参见 [`RcFile::find_in_sections`].
pub fn find_in_sections(var: &str, app: &str) -> Result<(String, String)> {
    RcFile::new(app).find_in_sections(var)
}

/// 获取一个存在的路径. 参见 [`RcFile::sys_path`].
pub fn get_sys_path(rcpath: &str, app: &str, section: Option<&str>) -> Result<PathBuf> {
    RcFile::new(app).sys_path(rcpath, section)
}
