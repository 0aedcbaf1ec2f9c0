use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiln::{
    reexports::wayland_protocols::xdg::shell::server::xdg_positioner::{Anchor, ConstraintAdjustment, Gravity},
    utils::{Logical, Rectangle},
    wayland::shell::xdg::Positioner,
};

fn positioner(anchor_x: i32) -> Positioner {
    Positioner {
        rect_size: (300, 400).into(),
        anchor_rect: Rectangle::from_loc_and_size((anchor_x, 20), (40, 20)),
        anchor_edges: Anchor::BottomRight,
        gravity: Gravity::BottomRight,
        constraint_adjustment: ConstraintAdjustment::all(),
        ..Default::default()
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let target: Rectangle<i32, Logical> = Rectangle::from_loc_and_size((0, 0), (1920, 1080));
    let fitting = positioner(100);
    let flipped = positioner(1800);

    c.bench_function("unconstrained_geometry_fits", |b| {
        b.iter(|| black_box(fitting).unconstrained_geometry(black_box(target)));
    });
    c.bench_function("unconstrained_geometry_flips", |b| {
        b.iter(|| black_box(flipped).unconstrained_geometry(black_box(target)));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
