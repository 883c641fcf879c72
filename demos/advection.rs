use std::thread;
use clap::Parser;
use log::{error, info, LevelFilter};
use rayon::prelude::*;
use simple_logger::SimpleLogger;
use gradmesh::message::{Communicator, SerialCommunicator, ThreadCommunicator};
use gradmesh::{
    adapt_one_step,
    update_ghosts,
    CellList,
    Config,
    Dirichlet,
    Domain,
    Error,
    Field,
    IndexBox,
    LevelSet,
    Mesh,
    MeshRole,
    Tag,
    Timers,
};




#[derive(Debug, Parser)]
#[clap(version = "1.0", about = "Upwind advection of a Gaussian bump on an adaptive mesh")]
struct Opts {
    #[clap(short = 'd', long, default_value = "1")]
    dim: usize,

    #[clap(short = 'r', long, default_value = "1")]
    ranks: usize,

    #[clap(long, default_value = "2")]
    min_level: usize,

    #[clap(long, default_value = "6")]
    max_level: usize,

    #[clap(short = 'n', long, default_value = "200")]
    steps: usize,

    #[clap(long, default_value = "0.5")]
    cfl: f64,

    #[clap(short = 'p', long)]
    periodic: bool,

    #[clap(long, default_value = "1")]
    order: usize,

    #[clap(long, default_value = "0.02")]
    threshold: f64,

    #[clap(long, default_value = "4")]
    adapt_every: usize,
}




// ============================================================================
fn velocity(axis: usize) -> f64 {
    if axis == 0 { 1.0 } else { 0.5 }
}

fn spacing(level: usize) -> f64 {
    1.0 / (1u64 << level) as f64
}

fn initial_value<const DIM: usize>(level: usize, cell: [i64; DIM]) -> f64 {
    let h = spacing(level);
    let r2: f64 = cell.iter().map(|&i| ((i as f64 + 0.5) * h - 0.5).powi(2)).sum();
    f64::exp(-100.0 * r2)
}

fn neighbour<const DIM: usize>(mut cell: [i64; DIM], axis: usize, delta: i64) -> [i64; DIM] {
    cell[axis] += delta;
    cell
}

fn leaves<const DIM: usize>(mesh: &Mesh<DIM>) -> Vec<(usize, [i64; DIM])> {
    (0..=mesh.config().max_level)
        .flat_map(move |level| mesh.level_set(MeshRole::Cells, level).cells().map(move |cell| (level, cell)))
        .collect()
}

fn all_reduce_sum<C: Communicator>(comm: &C, value: f64) -> gradmesh::Result<f64> {
    let decode = |bytes: &[u8]| f64::from_le_bytes(bytes.get(..8).and_then(|b| b.try_into().ok()).unwrap_or([0; 8]));
    let bytes = comm.all_reduce(|a, b| (decode(&a) + decode(&b)).to_le_bytes().to_vec(), value.to_le_bytes().to_vec())?;
    Ok(decode(&bytes))
}




/**
 * Tag by the undivided difference across each leaf along every axis.
 */
fn tag_by_gradient<const DIM: usize>(mesh: &Mesh<DIM>, u: &Field<f64, DIM>, threshold: f64) -> Field<Tag, DIM> {
    let mut tags = Field::new("tag", 1, mesh);

    for (level, cell) in leaves(mesh) {
        let centre = u.get(mesh, level, cell)[0];
        let value = |c| u.try_get(mesh, level, c).map_or(centre, |v| v[0]);
        let jump = (0..DIM)
            .map(|axis| (value(neighbour(cell, axis, 1)) - value(neighbour(cell, axis, -1))).abs())
            .fold(0.0, f64::max);

        tags.get_mut(mesh, level, cell)[0] = if jump > threshold {
            Tag::REFINE
        } else if jump > 0.25 * threshold {
            Tag::KEEP
        } else {
            Tag::COARSEN
        };
    }
    tags
}




/**
 * Advance the leaves by one first-order upwind step. Every leaf reads its
 * upwind neighbour at its own level, which the ghost update has filled.
 */
fn advance<const DIM: usize>(mesh: &Mesh<DIM>, u: &mut Field<f64, DIM>, dt: f64) {
    let cells = leaves(mesh);
    let field = &*u;

    let updated: Vec<f64> = cells
        .par_iter()
        .map(|&(level, cell)| {
            let h = spacing(level);
            let centre = field.get(mesh, level, cell)[0];
            let flux: f64 = (0..DIM)
                .map(|axis| velocity(axis) * (centre - field.get(mesh, level, neighbour(cell, axis, -1))[0]))
                .sum();
            centre - dt / h * flux
        })
        .collect();

    for ((level, cell), value) in cells.into_iter().zip(updated) {
        u.get_mut(mesh, level, cell)[0] = value
    }
}




// ============================================================================
fn run<C: Communicator, const DIM: usize>(opts: &Opts, comm: &C) -> gradmesh::Result<()> {
    let config = Config::with_levels(opts.min_level, opts.max_level).prediction_order(opts.order);
    let n = 1i64 << opts.max_level;
    let domain = Domain::new(opts.max_level, IndexBox::new([0; DIM], [n; DIM]), [opts.periodic; DIM]);
    let bc = Dirichlet(vec![0.0]);

    let chunks = 1i64 << opts.min_level;
    let ranks = comm.size() as i64;

    if ranks > chunks {
        return Err(Error::InvalidConfig(format!("{} ranks need at least {} cells at the minimum level", ranks, ranks)))
    }
    let subdomain = |rank: i64| {
        let scale = n / chunks;
        let mut start = [0; DIM];
        let mut end = [n; DIM];
        start[0] = rank * chunks / ranks * scale;
        end[0] = (rank + 1) * chunks / ranks * scale;
        LevelSet::from_box(opts.max_level, &IndexBox::new(start, end))
    };
    let rank = comm.rank() as i64;
    let local = subdomain(rank);
    let neighbours: Vec<_> = (0..ranks)
        .filter(|&r| r != rank)
        .map(|r| (r as usize, subdomain(r)))
        .collect();

    let mut cells = CellList::new(opts.max_level);
    cells.add_set(&local.on(opts.min_level));
    let mut mesh = Mesh::distributed(config, domain, local, cells, neighbours, comm)?;
    let mut timers = Timers::new();

    for _ in 0..=opts.max_level - opts.min_level {
        let u = Field::from_fn("u", 1, &mesh, |level, cell, u: &mut [f64]| u[0] = initial_value(level, cell));
        let mut tags = tag_by_gradient(&mesh, &u, opts.threshold);

        if adapt_one_step(&mut mesh, &mut tags, &mut [], comm, &mut timers)? {
            break
        }
    }
    let mut u = Field::from_fn("u", 1, &mesh, |level, cell, u: &mut [f64]| u[0] = initial_value(level, cell));
    let dt = opts.cfl * spacing(opts.max_level) / (0..DIM).map(velocity).sum::<f64>();
    let mut time = 0.0;

    for step in 0..opts.steps {
        update_ghosts(&mesh, &mut [&mut u], &bc, comm, &mut timers)?;

        if opts.adapt_every > 0 && step > 0 && step % opts.adapt_every == 0 {
            let mut tags = tag_by_gradient(&mesh, &u, opts.threshold);
            adapt_one_step(&mut mesh, &mut tags, &mut [&mut u], comm, &mut timers)?;
            update_ghosts(&mesh, &mut [&mut u], &bc, comm, &mut timers)?;
        }
        advance(&mesh, &mut u, dt);
        time += dt;
    }

    let mass: f64 = leaves(&mesh)
        .into_iter()
        .map(|(level, cell)| u.get(&mesh, level, cell)[0] * spacing(level).powi(DIM as i32))
        .sum();
    let mass = all_reduce_sum(comm, mass)?;

    if comm.rank() == 0 {
        info!("t = {:.4}: {} leaves on rank 0, total mass {:.6e}", time, mesh.nb_cells(MeshRole::Cells), mass);

        for (phase, duration, count) in timers.report() {
            info!("{:<12} {:>10.4}s {:>8} calls", format!("{:?}", phase), duration.as_secs_f64(), count);
        }
    }
    Ok(())
}

fn launch<const DIM: usize>(opts: &Opts) -> gradmesh::Result<()> {
    if opts.ranks <= 1 {
        return run::<_, DIM>(opts, &SerialCommunicator)
    }
    thread::scope(|scope| {
        let handles: Vec<_> = ThreadCommunicator::world(opts.ranks)
            .into_iter()
            .map(|comm| scope.spawn(move || run::<_, DIM>(opts, &comm)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(Error::Transport("rank thread panicked".into()))))
            .collect()
    })
}

fn main() {
    let opts = Opts::parse();

    if let Err(e) = SimpleLogger::new().with_level(LevelFilter::Info).init() {
        eprintln!("{}", e);
    }
    info!("{:?}", opts);

    let result = match opts.dim {
        1 => launch::<1>(&opts),
        2 => launch::<2>(&opts),
        d => Err(Error::InvalidConfig(format!("dimension {} is not supported", d))),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
