//! Saída de terminal do bookline: tabela de jobs colorida.
//!
//! Usa a crate `console` para estilização com cores. O [`JobTable`]
//! imprime os jobs do comando `status` e o resumo de uma varredura.

use console::Style;

use crate::engine::SweepReport;
use crate::state_machine::{Job, JobStatus};

/// Tabela de jobs para o terminal.
///
/// Jobs concluídos aparecem em verde, cancelados e expirados em vermelho,
/// os demais em amarelo.
pub struct JobTable {
    // Estilo verde para jobs concluídos.
    green: Style,
    // Estilo vermelho para jobs cancelados ou expirados.
    red: Style,
    // Estilo amarelo para jobs em aberto.
    yellow: Style,
    // Estilo do cabeçalho.
    header: Style,
}

impl Default for JobTable {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            header: Style::new().bold().underlined(),
        }
    }
}

impl JobTable {
    fn style_for(&self, status: JobStatus) -> &Style {
        match status {
            JobStatus::Completed => &self.green,
            JobStatus::Cancelled | JobStatus::Expired => &self.red,
            _ => &self.yellow,
        }
    }

    /// Formata uma linha da tabela, sem estilo.
    pub fn row(job: &Job) -> String {
        let translator = job
            .translator_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let flags = [
            (job.immediate, "immediate"),
            (job.flagged, "flagged"),
            (job.customer_not_call, "no-show"),
            (job.cancelled_late, "late"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(",");
        format!(
            "{:>5}  {:<11}  {:<16}  {:<4}  {:>4}m  {:>8}  {:>10}  {}",
            job.id,
            job.status.to_string(),
            job.scheduled_due_at.format("%Y-%m-%d %H:%M"),
            job.from_language,
            job.duration_min,
            job.customer_id,
            translator,
            flags
        )
    }

    /// Imprime todos os jobs, um por linha.
    pub fn print(&self, jobs: &[Job]) {
        if jobs.is_empty() {
            println!("  {}", self.yellow.apply_to("No jobs found"));
            return;
        }
        println!(
            "{}",
            self.header.apply_to(format!(
                "{:>5}  {:<11}  {:<16}  {:<4}  {:>5}  {:>8}  {:>10}  {}",
                "id", "status", "due", "lang", "dur", "customer", "translator", "flags"
            ))
        );
        for job in jobs {
            println!("{}", self.style_for(job.status).apply_to(Self::row(job)));
        }
    }

    /// Imprime o resumo de uma varredura.
    pub fn print_sweep(&self, report: &SweepReport) {
        if report.is_empty() {
            println!("  {} Nothing to do", self.green.apply_to("✓"));
            return;
        }
        let lines = [
            ("expired", &report.expired, &self.red),
            ("started", &report.started, &self.green),
            ("alerted", &report.alerted, &self.yellow),
            ("no-show cancelled", &report.no_show_cancelled, &self.red),
        ];
        for (label, ids, style) in lines {
            if !ids.is_empty() {
                println!("  {} {label}: {ids:?}", style.apply_to("•"));
            }
        }
    }
}
