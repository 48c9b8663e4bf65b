use console::Style;
use echelle_core::background::FitMethod;
use echelle_core::frame::{Fiber, Frame};
use echelle_core::pipeline::config::PipelineConfig;
use echelle_core::pipeline::{MatchedFrame, MeasuredFrame};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

fn print_frame(s: &Styles, frame: &Frame) {
    let meta = &frame.metadata;
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frame"),
        s.value.apply_to(&meta.file_id)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{}x{}", frame.width(), frame.height()))
    );
    match meta.obs_date {
        Some(date) => println!("  {:<14}{}", s.label.apply_to("Observed"), s.value.apply_to(date)),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Observed"),
            s.disabled.apply_to("unknown")
        ),
    }
}

fn print_storage(s: &Styles, config: &PipelineConfig) {
    match &config.archive {
        Some(path) => {
            let mode = if config.update_archive { "read/write" } else { "read" };
            println!(
                "  {:<14}{} ({})",
                s.label.apply_to("Archive"),
                s.path.apply_to(path.display()),
                mode
            );
        }
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Archive"),
            s.disabled.apply_to("none")
        ),
    }
    if let Some(dir) = &config.session_dir {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Session"),
            s.path.apply_to(dir.display())
        );
    }
}

pub fn print_fit_summary(frame: &Frame, fiber: Fiber, config: &PipelineConfig) {
    let s = Styles::new();
    let bkg = &config.background;

    print_title(&s, "Background Light");
    print_frame(&s, frame);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Fiber"),
        s.value.apply_to(fiber)
    );
    print_storage(&s, config);
    println!();

    println!("  {}", s.header.apply_to("Nodes"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Scan step"),
        s.value.apply_to(format!("{} px", bkg.scan_step))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Block mask"),
        s.value.apply_to(bkg.block_mask)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Extend"),
        s.value.apply_to(if bkg.extend { "yes" } else { "no" })
    );
    println!();

    println!("  {}", s.header.apply_to("Surface"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(&bkg.method)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Scale"),
        s.value.apply_to(bkg.scale)
    );
    if let FitMethod::Polynomial(p) = &bkg.method {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Max iter"),
            s.value.apply_to(p.maxiter)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Clip"),
            s.value.apply_to(format!("-{} / +{} sigma", p.lower_clip, p.upper_clip))
        );
    }
    println!();
}

pub fn print_fit_result(measured: &MeasuredFrame) {
    let s = Styles::new();
    let fit = &measured.fit.fit;

    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Nodes"),
        s.value.apply_to(format!(
            "{} ({} accepted)",
            measured.fit.nodes.len(),
            fit.accepted_count()
        ))
    );
    for it in &fit.iterations {
        println!(
            "    {:<12}{}",
            s.label.apply_to(format!("Round {}", it.iteration + 1)),
            s.value.apply_to(format!(
                "sigma {:.4}, {} -> {}",
                it.sigma, it.accepted_before, it.accepted_after
            ))
        );
    }
    let surface = measured.model.surface();
    if !surface.is_empty() {
        let max = surface.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = surface.iter().map(|&v| v as f64).sum::<f64>() / surface.len() as f64;
        println!(
            "    {:<12}{}",
            s.label.apply_to("Background"),
            s.value.apply_to(format!("max {max:.2}, mean {mean:.2}"))
        );
    }
    println!();
}

pub fn print_match_summary(
    frame: &Frame,
    fibers: &[(Fiber, String)],
    config: &PipelineConfig,
    session_models: usize,
) {
    let s = Styles::new();

    print_title(&s, "Background Matching");
    print_frame(&s, frame);
    print_storage(&s, config);
    println!(
        "  {:<14}{}",
        s.label.apply_to("Models"),
        s.value.apply_to(session_models)
    );
    println!();

    println!("  {}", s.header.apply_to("Fibers"));
    for (fiber, object) in fibers {
        println!(
            "    {:<12}{}",
            s.label.apply_to(fiber),
            s.method.apply_to(object)
        );
    }
    println!();
}

pub fn print_match_result(matched: &MatchedFrame) {
    let s = Styles::new();

    println!("  {}", s.header.apply_to("Matches"));
    for m in &matched.matches {
        let info = &m.model.info;
        println!(
            "    {:<12}{} {}",
            s.label.apply_to(info.fiber),
            s.path.apply_to(&info.file_id),
            s.value.apply_to(format!("x {:.3}", m.scale))
        );
    }
    println!();
}
