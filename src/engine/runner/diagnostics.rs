use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use petgraph::graph::NodeIndex;

use crate::WorkflowManager;
use crate::engine::TaskExecution;

/// Run diagnostics.
///
/// Returned by [`WorkflowManager::run`], it records when each task started and
/// how long it took.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// A map of task node indices to their execution metrics.
    pub execution_times: HashMap<NodeIndex, TaskExecution>,
    /// Number of waves, when the run used [`Schedule::Waves`](crate::Schedule::Waves).
    pub waves: Option<usize>,
}

impl Diagnostics {
    /// Total time spent inside callables, summed over all tasks.
    pub fn busy_time(&self) -> std::time::Duration {
        self.execution_times.values().map(|exec| exec.duration).sum()
    }

    /// Renders the task graph as a Mermaid diagram, color-coded by execution duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Gray**: Did not run in this pass
    pub fn render_mermaid(&self, wm: &WorkflowManager) -> String {
        self.mermaid(wm).to_string()
    }

    /// Same as [`render_mermaid`](Self::render_mermaid), as a value that can be
    /// written straight into any formatter.
    pub fn mermaid<'a>(&'a self, wm: &'a WorkflowManager) -> Mermaid<'a> {
        Mermaid {
            diagnostics: self,
            wm,
        }
    }
}

/// Mermaid rendering of a run, created by [`Diagnostics::mermaid`].
pub struct Mermaid<'a> {
    diagnostics: &'a Diagnostics,
    wm: &'a WorkflowManager,
}

impl Display for Mermaid<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let graph = &self.wm.graph;
        let times = &self.diagnostics.execution_times;

        writeln!(f, "graph LR")?;

        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for t in times.values() {
            let secs = t.duration.as_secs_f64();
            min_time = min_time.min(secs);
            max_time = max_time.max(secs);
        }

        if min_time > max_time {
            min_time = 0.0;
            max_time = 0.0;
        }

        if (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        for index in graph.node_indices() {
            let task = &graph[index];
            let name = task.name.replace('"', "#quot;");

            let (label_extra, color_code) = match times.get(&index) {
                Some(exec) => {
                    let label = match exec.wave {
                        Some(wave) => format!("{:.2?} (wave {wave})", exec.duration),
                        None => format!("{:.2?}", exec.duration),
                    };
                    let t = (exec.duration.as_secs_f64() - min_time) / (max_time - min_time);
                    (label, heat(t))
                }
                None if task.is_done() => ("Done".to_string(), "#ADD8E6".to_string()),
                None => ("Pending".to_string(), "#D3D3D3".to_string()),
            };

            writeln!(f, "    {}[\"{}\\n{}\"]", index.index(), name, label_extra)?;
            writeln!(f, "    style {} fill:{}", index.index(), color_code)?;
        }

        for edge in graph.raw_edges() {
            writeln!(
                f,
                "    {} --> {}",
                edge.source().index(),
                edge.target().index()
            )?;
        }

        Ok(())
    }
}

/// Green at 0.0, yellow at 0.5, red at 1.0.
fn heat(t: f64) -> String {
    let (r, g) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8)
    };

    format!("#{r:02X}{g:02X}00")
}
