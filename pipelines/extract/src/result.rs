//! 批处理结果.

use crate::profile::Profile;
use flair_berry::post_proc::{ClassScores, Metrics, MetricsSummary, RefineStats};
use std::io::{self, Write};
use std::time::Duration;

const S4: &str = "    ";

#[inline]
fn f64_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) => format!("{f:.6}"),
        None => "/".to_string(),
    }
}

#[inline]
fn u64_to_display(u: Option<u64>) -> String {
    match u {
        Some(u) => u.to_string(),
        None => "/".to_string(),
    }
}

/// 单个体数据的提取记录.
#[derive(Clone, Debug)]
pub struct VolumeRecord {
    /// 文件名.
    pub name: String,

    /// 精化统计.
    pub stats: RefineStats,

    /// 读取、精化与保存的总耗时.
    pub elapsed: Duration,

    /// 脑组织体积 (毫升). 仅当数据来自 nifti 文件时可用.
    pub brain_ml: Option<f64>,
}

/// 批处理最终结果.
#[derive(Debug, Default)]
pub struct RunReport {
    profile: Option<Profile>,
    volumes: Vec<VolumeRecord>,
    metrics: Vec<(String, Metrics)>,
    summary: MetricsSummary,
    failures: Vec<(String, String)>,
}

impl RunReport {
    /// 空结果.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录提取阶段的运行统计.
    #[inline]
    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = Some(profile);
    }

    /// 记录一次成功提取.
    #[inline]
    pub fn push_volume(&mut self, record: VolumeRecord) {
        self.volumes.push(record);
    }

    /// 记录一次验证结果.
    pub fn push_metrics(&mut self, name: String, metrics: Metrics) {
        self.summary.add(&metrics);
        self.metrics.push((name, metrics));
    }

    /// 记录一个被跳过的体数据及其原因.
    #[inline]
    pub fn push_failure(&mut self, name: String, reason: String) {
        self.failures.push((name, reason));
    }

    /// 成功提取的体数据.
    #[cfg(test)]
    pub fn volumes(&self) -> &[VolumeRecord] {
        &self.volumes
    }

    /// 逐体数据的验证结果.
    #[cfg(test)]
    pub fn metrics(&self) -> &[(String, Metrics)] {
        &self.metrics
    }

    /// 验证结果汇总.
    #[cfg(test)]
    pub fn summary(&self) -> &MetricsSummary {
        &self.summary
    }

    /// 被跳过的体数据.
    #[cfg(test)]
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// 将提取阶段统计写进 `w` 中.
    fn describe_profile_into<W: Write>(p: &Profile, w: &mut W) -> io::Result<()> {
        writeln!(w, "Extraction:")?;
        writeln!(w, "{S4}Refined volumes: {}", p.get_done())?;
        writeln!(w, "{S4}Skipped volumes: {}", p.get_failed())?;
        writeln!(w, "{S4}Volume time in total: {} us", p.get_volume_time_us())?;
        writeln!(
            w,
            "{S4}Average volume time: {} us",
            f64_to_display(p.get_avg_volume_time_us())
        )?;
        writeln!(w, "{S4}Total machine time: {} us", p.get_real_time_us())?;
        writeln!(w, "{S4}Eroded in total: {}", p.get_eroded())?;
        writeln!(w, "{S4}Discarded in total: {}", p.get_discarded())?;
        writeln!(w, "{S4}Hole-filled slices: {}", p.get_filled_slices())?;
        let t = p.get_most_time_consuming().map(|d| d.as_micros() as u64);
        writeln!(w, "{S4}Most time-consuming volume costs {} us", u64_to_display(t))
    }

    /// 将验证结果写进 `w` 中.
    fn describe_metrics_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        fn scores_into<W: Write>(label: &str, s: &ClassScores, w: &mut W) -> io::Result<()> {
            writeln!(
                w,
                "{S4}{S4}{label:<10} precision {:.4}  recall {:.4}  f-score {:.4}  support {}",
                s.precision, s.recall, s.f_score, s.support
            )
        }

        writeln!(w, "Validation:")?;
        for (name, m) in self.metrics.iter() {
            writeln!(
                w,
                "{S4}{name}: dice {:.4}, jaccard {:.4}, accuracy {:.4}, confusion {}",
                m.dice, m.jaccard, m.accuracy, m.confusion
            )?;
        }
        let s = &self.summary;
        writeln!(w, "{S4}Validated volumes: {}", s.len())?;
        writeln!(w, "{S4}Mean dice: {}", f64_to_display(s.mean_dice()))?;
        writeln!(w, "{S4}Mean jaccard: {}", f64_to_display(s.mean_jaccard()))?;
        writeln!(w, "{S4}Mean accuracy: {}", f64_to_display(s.mean_accuracy()))?;
        if let Some([background, brain]) = s.mean_scores() {
            scores_into("background", &background, w)?;
            scores_into("brain", &brain, w)?;
        }
        writeln!(w, "{S4}Summed confusion: {}", s.confusion())
    }

    /// 将全部结果写进 `w` 中, 各部分以分隔线隔开.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        utils::sep_to(&mut *w)?;
        if let Some(p) = &self.profile {
            Self::describe_profile_into(p, w)?;
            for v in self.volumes.iter() {
                writeln!(
                    w,
                    "{S4}{}: kept {} of {} regions, {} voxels out, {} ml, {} us",
                    v.name,
                    v.stats.kept,
                    v.stats.regions,
                    v.stats.output,
                    f64_to_display(v.brain_ml),
                    v.elapsed.as_micros()
                )?;
            }
            utils::sep_to(&mut *w)?;
        }
        if !self.summary.is_empty() {
            self.describe_metrics_into(w)?;
            utils::sep_to(&mut *w)?;
        }
        if !self.failures.is_empty() {
            writeln!(w, "Skipped:")?;
            for (name, reason) in self.failures.iter() {
                writeln!(w, "{S4}{name}: {reason}")?;
            }
            utils::sep_to(&mut *w)?;
        }
        Ok(())
    }

    /// 将全部结果打印到标准输出.
    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        self.describe_into(&mut stdout.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flair_berry::post_proc::ConfusionMatrix;

    #[test]
    fn test_describe_into() {
        let mut report = RunReport::new();
        report.set_profile(Profile::new().finish());
        report.push_volume(VolumeRecord {
            name: "a.npz".to_string(),
            stats: RefineStats::default(),
            elapsed: Duration::from_micros(42),
            brain_ml: None,
        });
        report.push_metrics(
            "a.npz".to_string(),
            Metrics::from_confusion(ConfusionMatrix {
                tn: 5,
                fp: 1,
                fn_: 1,
                tp: 3,
            }),
        );
        report.push_failure("b.npz".to_string(), "broken".to_string());

        let mut buf = Vec::new();
        report.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Refined volumes: 0"));
        assert!(text.contains("a.npz: kept 0 of 0 regions"));
        assert!(text.contains("Mean dice: 0.750000"));
        assert!(text.contains("confusion [[5, 1], [1, 3]]"));
        assert!(text.contains("b.npz: broken"));
    }
}
