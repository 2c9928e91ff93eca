// Nested processing steps of one (sequence, participant) pair
//
// Steps arrive as begin/end pairs. The number of steps open when a step
// begins is its depth, which the renderer uses as the row index.

use crate::string_arena::Symbol;

/// One recorded processing step in global time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingStep {
    pub start: f64,
    /// `None` while the step is still open
    pub end: Option<f64>,
    pub depth: u32,
    pub name: Symbol,
}

impl ProcessingStep {
    /// End time, with open steps extending to +infinity
    pub fn end_or_infinity(&self) -> f64 {
        self.end.unwrap_or(f64::INFINITY)
    }
}

/// Box emitted by a windowed query
///
/// `count > 1` means several steps narrower than the requested resolution
/// were merged; merged boxes carry no name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBox {
    pub start: f64,
    pub end: f64,
    pub depth: u32,
    pub name: Option<Symbol>,
    pub count: u32,
}

impl StepBox {
    fn is_narrow(&self, resolution: f64) -> bool {
        self.count > 1 || self.end - self.start < resolution
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepTimeline {
    steps: Vec<ProcessingStep>,
    /// Indices of currently open steps, innermost last
    open: Vec<usize>,
    depth_count: u32,
}

impl StepTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a step nested under the currently open ones; returns its depth
    pub fn begin(&mut self, at: f64, name: Symbol) -> u32 {
        let depth = self.open.len() as u32;
        self.open.push(self.steps.len());
        self.steps.push(ProcessingStep {
            start: at,
            end: None,
            depth,
            name,
        });
        self.depth_count = self.depth_count.max(depth + 1);
        depth
    }

    /// End the innermost open step; `None` if nothing was open
    pub fn end(&mut self, at: f64) -> Option<ProcessingStep> {
        let index = self.open.pop()?;
        let step = &mut self.steps[index];
        step.end = Some(at.max(step.start));
        Some(*step)
    }

    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    pub fn open_depth(&self) -> usize {
        self.open.len()
    }

    /// Number of rows (distinct depths) used so far
    pub fn depth_count(&self) -> u32 {
        self.depth_count
    }

    /// Steps overlapping `[window_start, window_end]`, downsampled per row
    ///
    /// Within one depth row, consecutive steps shorter than `resolution`
    /// (seconds per pixel, say) that start within `resolution` of the previous
    /// narrow box are folded into it. A non-positive resolution disables
    /// merging. Output is ordered by depth, then start.
    pub fn query(&self, window_start: f64, window_end: f64, resolution: f64) -> Vec<StepBox> {
        let mut rows: Vec<Vec<StepBox>> = vec![Vec::new(); self.depth_count as usize];

        for step in &self.steps {
            let end = step.end_or_infinity();
            if step.start > window_end || end < window_start {
                continue;
            }
            let row = &mut rows[step.depth as usize];

            if resolution > 0.0 && end - step.start < resolution {
                if let Some(last) = row.last_mut() {
                    if last.is_narrow(resolution) && step.start <= last.end + resolution {
                        last.end = last.end.max(end);
                        last.count += 1;
                        last.name = None;
                        continue;
                    }
                }
            }

            row.push(StepBox {
                start: step.start,
                end,
                depth: step.depth,
                name: Some(step.name),
                count: 1,
            });
        }

        for row in &mut rows {
            row.sort_by(|a, b| a.start.total_cmp(&b.start));
        }
        rows.into_iter().flatten().collect()
    }
}
