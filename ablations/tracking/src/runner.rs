//! 程序运行函数.

use std::thread;

use tract_berry::GridAttr;
use utils::{loader, phantom};

use crate::algos::Input;
use crate::result::AblationResult;

/// 体模边长 (体素).
const PHANTOM_SIZE: usize = 30;

/// 体模层数.
const PHANTOM_DEPTH: usize = 3;

/// 准备输入. 若 `$TRACT_DATA_DIR` (或 `$HOME/dataset/tract`) 下存在带 PMF 的受试者 `sub-001`,
/// 则使用之; 否则使用合成的交叉纤维体模.
fn prepare() -> Input {
    let dir = loader::data_dir_from_env_or_home();
    match loader::subject_loader([1], &dir).map(|mut l| l.next()) {
        Ok(Some((id, Ok(subject)))) if subject.pmf.is_some() => {
            log::info!("使用受试者 {id}: {}", dir.display());
            return Input::from_subject(subject);
        }
        Ok(Some((id, Ok(_)))) => log::warn!("受试者 {id} 没有 PMF, 改用合成体模"),
        Ok(Some((id, Err(e)))) => log::warn!("受试者 {id} 加载失败 ({e}), 改用合成体模"),
        Ok(None) => {}
        Err(e) => log::debug!("{e}"),
    }
    log::info!("使用合成交叉纤维体模 {PHANTOM_SIZE}x{PHANTOM_SIZE}x{PHANTOM_DEPTH}");
    Input::from_phantom(phantom::crossing(PHANTOM_SIZE, PHANTOM_DEPTH, 2.0))
}

/// 实际运行.
pub fn run() -> AblationResult {
    let input = prepare();
    assert!(input.fa.same_space(&input.pmf), "Loading dataset config error");
    let p = &input;

    println!("Running ablation studies...");
    thread::scope(|s| {
        use super::algos::*;

        let handles = [peak_deterministic, pmf_deterministic, pmf_probabilistic, pmf_probabilistic_par]
            .map(|t| s.spawn(move || t(p)));

        AblationResult::from_iter(
            ["peak-deterministic", "pmf-deterministic", "pmf-probabilistic", "pmf-probabilistic-par"]
                .into_iter()
                .zip(
                    handles
                        .into_iter()
                        .map(|th| th.join().expect("Thread joining error")),
                ),
        )
    })
}
