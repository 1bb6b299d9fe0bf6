//! 多个 ini 配置文件的合并读取, 以及 `${option}` / `${section:option}` 变量插值.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ini::{Ini, ParseOption};

use super::Settings;
use crate::consts::rc::{DEFAULT_SECTION, MAX_INTERPOLATION_DEPTH};
use crate::error::{Error, Result};

/// 合并后的配置. section 保持首次出现的顺序, 选项名统一为小写.
///
/// 后读取的文件中的同名选项会覆盖先读取的.
/// `[DEFAULT]` section 中的选项被所有 section 继承.
#[derive(Debug, Clone, Default)]
pub struct Config {
    defaults: Settings,
    sections: Vec<(String, Settings)>,
}

impl Config {
    /// 依次读取 `paths` 中存在的文件. 不存在的路径被忽略.
    ///
    /// # 返回值
    ///
    /// `(合并后的配置, 实际读取的文件)`.
    pub fn read<I, P>(paths: I) -> Result<(Self, Vec<PathBuf>)>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut ans = Self::default();
        let mut read = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                continue;
            }
            ans.read_file(path).map_err(|e| {
                log::error!("Error parsing rcfile {}: {e}", path.display());
                e
            })?;
            read.push(path.to_owned());
        }
        Ok((ans, read))
    }

    /// 读取单个文件并合并到已有配置中.
    pub fn read_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let opt = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_file_opt(path.as_ref(), opt)?;
        self.merge_ini(&ini, &path.as_ref().display().to_string());
        Ok(())
    }

    /// 从字符串读取并合并到已有配置中. 主要用于测试.
    pub fn read_str(&mut self, content: &str) -> Result<()> {
        let opt = ParseOption {
            enabled_quote: false,
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = Ini::load_from_str_opt(content, opt).map_err(ini::Error::Parse)?;
        self.merge_ini(&ini, "<string>");
        Ok(())
    }

    fn merge_ini(&mut self, ini: &Ini, source: &str) {
        for (section, props) in ini.iter() {
            let Some(section) = section else {
                if !props.is_empty() {
                    log::warn!("Options outside of any section in {source} are ignored.");
                }
                continue;
            };
            let target = self.section_mut(section);
            for (k, v) in props.iter() {
                target.insert(k.trim().to_lowercase(), v.to_owned());
            }
        }
    }

    fn section_mut(&mut self, name: &str) -> &mut Settings {
        if name == DEFAULT_SECTION {
            return &mut self.defaults;
        }
        let pos = match self.sections.iter().position(|(n, _)| n == name) {
            Some(pos) => pos,
            None => {
                self.sections.push((name.to_owned(), BTreeMap::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[pos].1
    }

    fn section(&self, name: &str) -> Option<&Settings> {
        self.sections
            .iter()
            .find_map(|(n, s)| (n == name).then_some(s))
    }

    /// 所有 section 名 (不含 `DEFAULT`), 按首次出现的顺序排列.
    pub fn sections(&self) -> Vec<String> {
        self.sections.iter().map(|(n, _)| n.clone()).collect()
    }

    /// 是否存在 section `name`. `DEFAULT` 不算作 section.
    #[inline]
    pub fn has_section(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    /// 未经插值的原始选项值. section 中没有时回退到 `DEFAULT`.
    fn raw_get(&self, section: &str, option: &str) -> Option<&str> {
        let own = if section == DEFAULT_SECTION {
            None
        } else {
            self.section(section)?.get(option)
        };
        own.or_else(|| self.defaults.get(option)).map(String::as_str)
    }

    /// 获取插值后的选项值. 选项不存在时返回 `Ok(None)`.
    pub fn get(&self, section: &str, option: &str) -> Result<Option<String>> {
        let option = option.to_lowercase();
        match self.raw_get(section, &option) {
            Some(raw) => Ok(Some(self.interpolate(section, &option, raw, 1)?)),
            None => Ok(None),
        }
    }

    /// 获取 section 中的全部选项 (包括继承自 `DEFAULT` 的), 并完成插值.
    /// section 不存在时返回空表.
    pub fn items(&self, section: &str) -> Result<Settings> {
        let Some(own) = self.section(section) else {
            return Ok(Settings::new());
        };
        let mut ans = Settings::new();
        for (k, raw) in self.defaults.iter().chain(own.iter()) {
            if ans.contains_key(k) {
                continue;
            }
            let raw = own.get(k).unwrap_or(raw);
            ans.insert(k.clone(), self.interpolate(section, k, raw, 1)?);
        }
        Ok(ans)
    }

    fn interpolate(&self, section: &str, option: &str, value: &str, depth: usize) -> Result<String> {
        let err = |reason: String| Error::Interpolation {
            section: section.to_owned(),
            option: option.to_owned(),
            reason,
        };
        if depth > MAX_INTERPOLATION_DEPTH {
            return Err(err(format!("recursion limit exceeded in {value:?}")));
        }

        let mut ans = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(p) = rest.find('$') {
            ans.push_str(&rest[..p]);
            rest = &rest[p..];
            match rest[1..].chars().next() {
                Some('$') => {
                    ans.push('$');
                    rest = &rest[2..];
                }
                Some('{') => {
                    let end = rest
                        .find('}')
                        .ok_or_else(|| err(format!("bad interpolation variable reference {rest:?}")))?;
                    let path = &rest[2..end];
                    rest = &rest[end + 1..];

                    let (sect, opt) = match path.split(':').collect::<Vec<_>>().as_slice() {
                        [opt] => (section, opt.to_lowercase()),
                        [sect, opt] => (*sect, opt.to_lowercase()),
                        _ => return Err(err(format!("more than one ':' found in {path:?}"))),
                    };
                    let v = self
                        .raw_get(sect, &opt)
                        .ok_or_else(|| err(format!("missing option {path:?}")))?;
                    if v.contains('$') {
                        ans.push_str(&self.interpolate(sect, &opt, v, depth + 1)?);
                    } else {
                        ans.push_str(v);
                    }
                }
                _ => {
                    return Err(err(format!(
                        "'$' must be followed by '$' or '{{', found: {rest:?}"
                    )))
                }
            }
        }
        ans.push_str(rest);
        Ok(ans)
    }
}
