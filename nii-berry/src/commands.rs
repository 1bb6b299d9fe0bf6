//! 外部命令调用, 以及 HTCondor 任务队列提交.

use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::consts::condor;
use crate::error::{Error, Result};

/// 在 `PATH` 中查找程序 `program` 的绝对路径.
#[inline]
pub fn which(program: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(program).ok()
}

/// 执行命令 `args[0]`, 参数为 `args[1..]`, 返回其标准输出.
///
/// 只捕获标准输出, 标准输入与标准错误直接继承自当前进程.
/// 命令的退出码被忽略. `args` 为空时返回 `Err(Error::EmptyCommand)`,
/// 找不到程序时返回 `Err(Error::CommandNotFound)`.
pub fn check_call<S: AsRef<OsStr>>(args: &[S]) -> Result<Vec<u8>> {
    let (program, rest) = args.split_first().ok_or(Error::EmptyCommand)?;
    let output = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::CommandNotFound(program.as_ref().to_string_lossy().into_owned()),
            _ => e.into(),
        })?;
    Ok(output.stdout)
}

/// 通过 `sh -c` 执行 `cmd`, 返回退出码. 被信号终止时返回 `-1`.
fn shell(cmd: &str) -> Result<i32> {
    let status = Command::new(condor::SHELL).arg("-c").arg(cmd).status()?;
    Ok(status.code().unwrap_or(-1))
}

/// 任务队列. 包括查询队列状态的程序和提交任务的程序.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobQueue {
    status: String,
    submit: String,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(condor::STATUS, condor::SUBMIT)
    }
}

impl JobQueue {
    /// 以状态查询程序 `status` 和提交程序 `submit` 创建任务队列.
    pub fn new(status: impl Into<String>, submit: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            submit: submit.into(),
        }
    }

    /// 队列是否正在运行, 即状态查询程序是否成功退出.
    pub fn is_running(&self) -> Result<bool> {
        let code = shell(&self.status).map_err(|e| {
            log::error!("Could not find a running instance of the job queue: {e}");
            e
        })?;
        Ok(code == 0)
    }

    /// 提交 `cmd` 时实际调用的命令前缀. 任务名取 `cmd` 的第一个单词.
    pub fn submit_command(&self, cmd: &str) -> Result<String> {
        let name = cmd.split_whitespace().next().ok_or(Error::EmptyCommand)?;
        Ok(format!("{} -shell n -b y -r y -N {name} -m n", self.submit))
    }

    /// 将 `cmd` 提交到队列, 返回提交命令的退出码.
    pub fn submit(&self, cmd: &str) -> Result<i32> {
        if !self.is_running()? {
            log::warn!("Job queue status command `{}` failed.", self.status);
        }
        let sub_cmd = self.submit_command(cmd)?;
        log::info!("Calling: {sub_cmd}");
        shell(&format!("{sub_cmd} {cmd}"))
    }

    /// 尝试将 `cmd` 提交到队列. 提交失败 (退出码非零) 时直接在本地执行 `cmd`.
    ///
    /// # 返回值
    ///
    /// 提交成功时为 `0`, 否则为本地执行的退出码.
    pub fn call(&self, cmd: &str) -> Result<i32> {
        log::info!("{cmd}");
        match self.submit(cmd)? {
            0 => Ok(0),
            code => {
                log::info!("Submission returned {code}, running locally.");
                shell(cmd)
            }
        }
    }
}

/// 将 `cmd` 提交到 HTCondor 队列, 返回提交命令的退出码.
pub fn condor_submit(cmd: &str) -> Result<i32> {
    JobQueue::default().submit(cmd)
}

/// 尝试将 `cmd` 提交到 HTCondor 队列, 失败时在本地执行.
pub fn condor_call(cmd: &str) -> Result<i32> {
    JobQueue::default().call(cmd)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_which() {
        assert!(which("sh").is_some());
        assert!(which("definitely-not-a-program-4d1f").is_none());
    }

    #[test]
    fn test_check_call() {
        assert_eq!(check_call(&["echo", "hello"]).unwrap(), b"hello\n");
        assert!(matches!(check_call::<&str>(&[]), Err(Error::EmptyCommand)));
        assert!(matches!(
            check_call(&["definitely-not-a-program-4d1f"]),
            Err(Error::CommandNotFound(_))
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_check_call_keeps_stderr() {
        let out = check_call(&["sh", "-c", "echo to-stderr >&2; echo out"]).unwrap();
        assert_eq!(out, b"out\n");

        let ours = std::fs::read_link("/proc/self/fd/2").unwrap();
        let theirs = check_call(&["readlink", "/proc/self/fd/2"]).unwrap();
        assert_eq!(String::from_utf8_lossy(&theirs).trim_end(), ours.to_string_lossy());
    }

    #[test]
    fn test_submit_command() {
        let q = JobQueue::default();
        assert_eq!(
            q.submit_command("fslmaths a.nii -mul 2 b.nii").unwrap(),
            "condor_qsub -shell n -b y -r y -N fslmaths -m n"
        );
        assert!(matches!(q.submit_command("   "), Err(Error::EmptyCommand)));
    }

    #[test]
    fn test_call_falls_back_to_local() {
        let q = JobQueue::new("true", "false");
        assert_eq!(q.submit("exit 3").unwrap(), 1);
        assert_eq!(q.call("exit 3").unwrap(), 3);
    }

    #[test]
    fn test_call_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let q = JobQueue::new("false", "true");
        let cmd = format!("touch {}", marker.display());
        assert_eq!(q.call(&cmd).unwrap(), 0);
        assert!(!marker.exists());
    }
}
