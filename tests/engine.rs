use std::thread;

use pixform::{Boundary, EvalResult, Image, Images, Settings, compile, compile_with, fill, fill_with};

fn gradient(w: usize, h: usize) -> Image {
    let data = (0..w * h).map(|k| (k % w) as f64 + 100.0 * (k / w) as f64).collect();
    Image::with_data(w, h, 1, 1, data).unwrap()
}

#[test]
fn forks_evaluate_independently_on_threads() {
    let img = gradient(8, 4);
    let program = compile("a = i*2; a + t", &Images::input(&img)).unwrap();
    assert!(program.is_parallelizable());

    let rows: Vec<Vec<f64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|y| {
                let mut worker = program.fork(y);
                let img = &img;
                scope.spawn(move || {
                    let mut images = Images::input(img);
                    (0..8)
                        .map(|x| match worker.evaluate_at([x as f64, y as f64, 0.0, 0.0], &mut images) {
                            EvalResult::Scalar(v) => v,
                            other => panic!("unexpected {other:?}"),
                        })
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (y, row) in rows.iter().enumerate() {
        for (x, v) in row.iter().enumerate() {
            assert_eq!(*v, 2.0 * (x as f64 + 100.0 * y as f64) + y as f64, "at ({x}, {y})");
        }
    }
}

#[test]
fn begin_state_is_copied_into_forks() {
    let img = gradient(2, 1);
    let mut images = Images::input(&img);
    let mut program = compile("begin(n = 40); n + 2", &images).unwrap();
    program.run_begin(&mut images);
    let mut worker = program.fork(3);
    assert_eq!(worker.evaluate(&mut images), EvalResult::Scalar(42.0));
}

#[test]
fn nested_critical_sections_run_on_every_fork() {
    let program = compile("critical(a = x; critical(a + 1))", &Images::none()).unwrap();
    let totals: Vec<f64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|k| {
                let mut worker = program.fork(k);
                scope.spawn(move || {
                    let mut images = Images::none();
                    (0..100)
                        .map(|x| worker.evaluate_at([x as f64, 0.0, 0.0, 0.0], &mut images).as_scalar().unwrap())
                        .sum()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let expected: f64 = (1..=100).map(f64::from).sum();
    assert!(totals.iter().all(|&t| t == expected), "{totals:?}");
}

#[test]
fn fill_large_image_matches_pointwise_evaluation() {
    let mut img = gradient(64, 32);
    let original = img.clone();
    let stats = fill(&mut img, "(j(1) - j(-1)) / 2", &mut []).unwrap();
    assert_eq!(stats.pixels, 64 * 32);

    let mut images = Images::input(&original);
    let mut program = compile("(j(1) - j(-1)) / 2", &images).unwrap();
    for y in 0..32 {
        for x in 0..64 {
            let want = program.evaluate_at([x as f64, y as f64, 0.0, 0.0], &mut images).as_scalar().unwrap();
            assert_eq!(img.get(x, y, 0, 0), want, "at ({x}, {y})");
        }
    }
}

#[test]
fn fill_with_settings_uses_the_boundary() {
    let mut img = gradient(4, 1);
    let settings = Settings { boundary: Boundary::Neumann, ..Settings::default() };
    fill_with(&mut img, "j(-1)", &mut [], &settings).unwrap();
    assert_eq!(img.data(), &[0.0, 0.0, 1.0, 2.0]);

    let mut img = gradient(4, 1);
    let settings = Settings { boundary: Boundary::Periodic, ..Settings::default() };
    fill_with(&mut img, "j(-1)", &mut [], &settings).unwrap();
    assert_eq!(img.data(), &[3.0, 0.0, 1.0, 2.0]);
}

#[test]
fn fill_with_channel_vectors() {
    let mut img = Image::new(2, 2, 1, 3);
    fill(&mut img, "[x, y, x+y]", &mut []).unwrap();
    assert_eq!(img.get(1, 1, 0, 2), 2.0);
    assert_eq!(img.get(1, 0, 0, 1), 0.0);

    fill(&mut img, "reverse(I)", &mut []).unwrap();
    assert_eq!(img.get(1, 1, 0, 0), 2.0);
    assert_eq!(img.get(1, 0, 0, 2), 1.0);
}

#[test]
fn end_segment_runs_after_the_fill() {
    let mut img = Image::new(3, 1, 1, 1);
    let mut list = [Image::new(1, 1, 1, 1)];
    fill(&mut img, "end(i(#0, 0) = 9); x", &mut list).unwrap();
    assert_eq!(img.data(), &[0.0, 1.0, 2.0]);
    assert_eq!(list[0].data(), &[9.0]);
}

#[test]
fn seeded_compiles_are_reproducible_across_forks() {
    let settings = Settings { seed: Some(99), ..Settings::default() };
    let a = compile_with("u()", &Images::none(), &settings).unwrap();
    let b = compile_with("u()", &Images::none(), &settings).unwrap();
    let (mut fa, mut fb) = (a.fork(2), b.fork(2));
    let mut images = Images::none();
    assert_eq!(fa.evaluate(&mut images), fb.evaluate(&mut images));
    let mut other = a.fork(3);
    let seq_a: Vec<_> = (0..4).map(|_| fa.evaluate(&mut images)).collect();
    let seq_c: Vec<_> = (0..4).map(|_| other.evaluate(&mut images)).collect();
    assert_ne!(seq_a, seq_c);
}
