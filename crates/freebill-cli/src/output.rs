use chrono::{DateTime, Utc};
use freebill_recurring::types::format_minor_units;
use freebill_recurring::{GenerationReport, RecurringTemplate};

pub fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn print_templates(templates: &[RecurringTemplate]) {
    if templates.is_empty() {
        println!("No recurring templates.");
        return;
    }
    println!(
        "{:<36}  {:<16}  {:>14}  {:<10}  {:<10}  {:<7}  {:>5}",
        "ID", "CLIENT", "AMOUNT", "FREQUENCY", "NEXT", "STATUS", "COUNT"
    );
    for t in templates {
        println!(
            "{:<36}  {:<16}  {:>14}  {:<10}  {:<10}  {:<7}  {:>5}",
            t.id,
            t.client_id,
            format!("{} {}", format_minor_units(t.amount_cents), t.currency),
            t.frequency,
            date(t.next_generation_date),
            t.status(),
            t.generated_count
        );
    }
}

pub fn print_report(report: &GenerationReport) {
    if report.dry_run {
        if report.previews.is_empty() {
            println!("Dry run: nothing to generate.");
        }
        for p in &report.previews {
            println!(
                "[dry-run] {} -> client {}: {} {} ({}), issued {} due {}, next {}",
                p.template_id,
                p.client_id,
                format_minor_units(p.amount_cents),
                p.currency,
                p.frequency,
                p.issued_on,
                p.due_on,
                date(p.projected_next_date)
            );
        }
        return;
    }

    for g in &report.generated {
        println!(
            "Generated {} for client {} (template {}), due {}, next {}",
            g.invoice.number,
            g.client_id,
            g.template_id,
            g.invoice.due_on,
            date(g.next_generation_date)
        );
        for w in &g.warnings {
            println!("  warning: {} failed: {}", w.hook, w.message);
        }
    }
    for f in &report.failures {
        eprintln!("error: {f}");
    }
    println!(
        "{} invoice(s) generated, {} warning(s), {} failure(s)",
        report.generated_count(),
        report.warning_count(),
        report.failures.len()
    );
}
