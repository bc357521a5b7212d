use clap::Parser;
use sheet_optimizer::guillotine::ScoreStrategy;
use sheet_optimizer::{Decoder, Grain, OptimizerConfig, Part, Rect, SheetType, optimize};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "sheet_optimizer",
    about = "Cabinet part cutting optimizer (genetic algorithm over sheet layouts)"
)]
struct Cli {
    /// Stock sheets as WxH:cost[:kerf[:grain]] (e.g. 2440x1220:40 3050x1220:55:3:width)
    #[arg(long = "sheet", num_args = 1.., required = true)]
    sheets: Vec<String>,

    /// Parts as [id=]WxH:qty[:grain] (e.g. side=720x560:4 door=715x397:2:height)
    #[arg(long = "part", num_args = 1..)]
    parts: Vec<String>,

    /// Kerf in mm for sheets that do not give their own
    #[arg(long, default_value_t = 0)]
    kerf: u32,

    #[arg(long, default_value_t = 50)]
    population: usize,

    #[arg(long, default_value_t = 100)]
    generations: usize,

    /// Stop after this many generations without improvement (0 disables)
    #[arg(long, default_value_t = 20)]
    stall: usize,

    #[arg(long, default_value_t = 0.1)]
    elitism: f64,

    #[arg(long, default_value_t = 0.8)]
    crossover: f64,

    #[arg(long, default_value_t = 0.1)]
    mutation: f64,

    #[arg(long, default_value_t = 3)]
    tournament: usize,

    /// PRNG seed; omit for a different run every time
    #[arg(long)]
    seed: Option<u64>,

    /// Time budget in milliseconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Packing heuristic: shelf, guillotine, guillotine-short, guillotine-long or bottom-left
    #[arg(long, default_value = "shelf", value_parser = parse_decoder)]
    decoder: Decoder,

    /// Evaluate generations on a single thread
    #[arg(long)]
    sequential: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn parse_decoder(s: &str) -> Result<Decoder, String> {
    match s {
        "shelf" => Ok(Decoder::Shelf),
        "guillotine" => Ok(Decoder::Guillotine(ScoreStrategy::BestAreaFit)),
        "guillotine-short" => Ok(Decoder::Guillotine(ScoreStrategy::BestShortSideFit)),
        "guillotine-long" => Ok(Decoder::Guillotine(ScoreStrategy::BestLongSideFit)),
        "bottom-left" => Ok(Decoder::BottomLeft),
        _ => Err(format!(
            "invalid decoder '{}', expected: shelf, guillotine, guillotine-short, guillotine-long or bottom-left",
            s
        )),
    }
}

fn parse_dimensions(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("invalid dimensions '{}', expected WxH", s));
    }
    let width = parts[0]
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let height = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if width == 0 || height == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok(Rect::new(width, height))
}

fn parse_sheet(s: &str, index: usize, default_kerf: u32) -> Result<SheetType, String> {
    let fields: Vec<&str> = s.split(':').collect();
    if !(2..=4).contains(&fields.len()) {
        return Err(format!("invalid sheet '{}', expected WxH:cost[:kerf[:grain]]", s));
    }
    let rect = parse_dimensions(fields[0])?;
    let cost = fields[1]
        .parse::<f64>()
        .map_err(|_| format!("invalid cost in '{}'", s))?;
    let kerf = match fields.get(2) {
        Some(k) => k.parse::<u32>().map_err(|_| format!("invalid kerf in '{}'", s))?,
        None => default_kerf,
    };
    let grain = match fields.get(3) {
        Some(g) => g.parse::<Grain>()?,
        None => Grain::None,
    };
    Ok(SheetType::new(format!("{}#{}", fields[0], index + 1), rect.w, rect.h, cost)
        .with_kerf(kerf)
        .with_grain(grain))
}

fn parse_part(s: &str, index: usize) -> Result<Part, String> {
    let (id, desc) = match s.split_once('=') {
        Some((id, desc)) => (id.to_string(), desc),
        None => (format!("P{}", index + 1), s),
    };
    let fields: Vec<&str> = desc.split(':').collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(format!("invalid part '{}', expected [id=]WxH:qty[:grain]", s));
    }
    let rect = parse_dimensions(fields[0])?;
    let qty = fields[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity in '{}'", s))?;
    if qty == 0 {
        return Err(format!("quantity must be non-zero in '{}'", s));
    }
    let grain = match fields.get(2) {
        Some(g) => g.parse::<Grain>()?,
        None => Grain::None,
    };
    Ok(Part::new(id, rect.w, rect.h, qty).with_grain(grain))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(if cli.verbose { Level::INFO } else { Level::WARN })
        .init();

    let sheets: Vec<SheetType> = cli
        .sheets
        .iter()
        .enumerate()
        .map(|(i, s)| parse_sheet(s, i, cli.kerf))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| fail(e));

    let parts: Vec<Part> = cli
        .parts
        .iter()
        .enumerate()
        .map(|(i, p)| parse_part(p, i))
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_else(|e| fail(e));

    let config = OptimizerConfig {
        population_size: cli.population,
        generations: cli.generations,
        stall_limit: (cli.stall > 0).then_some(cli.stall),
        elitism: cli.elitism,
        crossover_rate: cli.crossover,
        mutation_rate: cli.mutation,
        tournament_size: cli.tournament,
        seed: cli.seed,
        time_limit_ms: cli.time_limit,
        decoder: cli.decoder,
        heuristic_seeding: true,
        parallel: !cli.sequential,
    };

    let result = optimize(&parts, &sheets, &config).unwrap_or_else(|e| fail(e));

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(e),
        }
        return;
    }

    for (i, &t) in result.layout.sheets.iter().enumerate() {
        let sheet = &sheets[t];
        println!("Sheet {} ({}, cost {:.2}):", i + 1, sheet.rect(), sheet.cost);
        for p in result.layout.placements_on(i) {
            let rot = if p.rotated { " [rotated]" } else { "" };
            println!("  {} {} @ ({}, {}){}", parts[p.part].id, p.rect, p.x, p.y, rot);
        }
        println!();
    }

    let summary = &result.summary;
    println!(
        "Summary: {} sheet{} used, cost {:.2}, {:.1}% waste ({} generations, stopped: {:?})",
        summary.sheet_count,
        if summary.sheet_count == 1 { "" } else { "s" },
        summary.cost,
        summary.waste_percent,
        result.generations,
        result.stop_reason,
    );
}
