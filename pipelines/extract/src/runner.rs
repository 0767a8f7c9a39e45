//! 程序运行函数.

use crate::config::ExtractConfig;
use crate::profile::Profile;
use crate::result::{RunReport, VolumeRecord};
use anyhow::Context;
use flair_berry::consts::field;
use flair_berry::post_proc::{validate_mask, MaskRefiner};
use flair_berry::prelude::*;
use log::{info, warn};
use std::path::Path;
use utils::loader;

/// 实际运行: 依配置提取和/或验证.
pub fn run(cfg: &ExtractConfig) -> anyhow::Result<RunReport> {
    let mut report = RunReport::new();
    if cfg.mode.extracts() {
        extract(cfg, &mut report)?;
    }
    if cfg.mode.validates() {
        validate(cfg, &mut report)?;
    }
    Ok(report)
}

/// 单个体数据失败时, 依 `keep_going` 决定中止或记录后跳过.
fn handle_failure(
    cfg: &ExtractConfig,
    report: &mut RunReport,
    name: String,
    e: anyhow::Error,
) -> anyhow::Result<()> {
    if cfg.keep_going {
        warn!("skipping `{name}`: {e:#}");
        report.push_failure(name, format!("{e:#}"));
        Ok(())
    } else {
        Err(e)
    }
}

/// 去掉所有后缀的文件名, 例如 `case01.nii.gz` -> `case01`.
#[inline]
fn stem_of(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// 提取阶段: 阈值分割, 精化, 保存.
fn extract(cfg: &ExtractConfig, report: &mut RunReport) -> anyhow::Result<()> {
    std::fs::create_dir_all(&cfg.output_dir).with_context(|| {
        format!("cannot create output directory `{}`", cfg.output_dir.display())
    })?;
    if let Some(dir) = &cfg.preview_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create preview directory `{}`", dir.display()))?;
    }

    let scans = loader::scan_loader(&cfg.source_dir).with_context(|| {
        format!("cannot list source directory `{}`", cfg.source_dir.display())
    })?;
    info!(
        "extracting {} volumes from `{}` with intensity window [{}, {}]",
        scans.len(),
        cfg.source_dir.display(),
        cfg.window.lower_bound(),
        cfg.window.upper_bound()
    );

    let refiner = MaskRefiner::new(&cfg.eroder, &cfg.dilater).with_connectivity(cfg.connectivity);
    let mut profile = Profile::new();

    for (name, scan) in scans {
        profile.volume_start();
        let outcome = scan
            .with_context(|| format!("cannot open `{name}`"))
            .and_then(|scan| extract_one(cfg, &refiner, &name, &scan));
        let elapsed = profile.volume_elapsed();

        match outcome {
            Ok((stats, brain_ml)) => {
                info!(
                    "`{name}`: {} -> {} brain voxels in {} ms",
                    stats.input,
                    stats.output,
                    elapsed.as_millis()
                );
                profile.count_done(&stats);
                report.push_volume(VolumeRecord {
                    name,
                    stats,
                    elapsed,
                    brain_ml,
                });
            }
            Err(e) => {
                profile.count_failed();
                handle_failure(cfg, report, name, e)?;
            }
        }
    }

    report.set_profile(profile.finish());
    Ok(())
}

/// 处理单个扫描, 返回精化统计与脑组织体积.
fn extract_one(
    cfg: &ExtractConfig,
    refiner: &MaskRefiner,
    name: &str,
    scan: &FlairScan,
) -> anyhow::Result<(flair_berry::post_proc::RefineStats, Option<f64>)> {
    let raw = scan.threshold(&cfg.window);
    let refined = refiner
        .refine_with_stats(&raw)
        .with_context(|| format!("cannot refine `{name}`"))?;
    let mask = refined.mask;

    let out = cfg.output_dir.join(name);
    mask.save_as(&out, field::MASK, cfg.encoding)
        .with_context(|| format!("cannot save `{}`", out.display()))?;

    if let Some(dir) = &cfg.preview_dir {
        save_preview(&mask, &dir.join(format!("{}.png", stem_of(name))))?;
    }
    Ok((refined.stats, mask.brain_volume_ml()))
}

/// 保存中间水平切片的预览图.
fn save_preview(mask: &BrainMask, path: &Path) -> anyhow::Result<()> {
    if mask.len_z() == 0 {
        return Ok(());
    }
    mask.slice_at(mask.len_z() / 2)
        .save(path)
        .with_context(|| format!("cannot save preview `{}`", path.display()))
}

/// 验证阶段: 以真值验证输出目录中的每个掩膜.
fn validate(cfg: &ExtractConfig, report: &mut RunReport) -> anyhow::Result<()> {
    let masks = loader::mask_loader(&cfg.output_dir).with_context(|| {
        format!("cannot list output directory `{}`", cfg.output_dir.display())
    })?;
    info!(
        "validating {} masks against `{}`",
        masks.len(),
        cfg.truth_dir.display()
    );

    for (name, predicted) in masks {
        let outcome = predicted
            .with_context(|| format!("cannot open mask `{name}`"))
            .and_then(|predicted| {
                let path = cfg.truth_dir.join(&name);
                let truth = BrainMask::open(&path, field::TRUTH)
                    .with_context(|| format!("cannot open truth `{}`", path.display()))?;
                validate_mask(&truth, &predicted)
                    .with_context(|| format!("cannot validate `{name}`"))
            });

        match outcome {
            Ok(metrics) => {
                info!(
                    "`{name}`: dice {:.4}, jaccard {:.4}",
                    metrics.dice, metrics.jaccard
                );
                report.push_metrics(name, metrics);
            }
            Err(e) => handle_failure(cfg, report, name, e)?,
        }
    }
    Ok(())
}
