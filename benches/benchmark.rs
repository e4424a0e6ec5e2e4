#[macro_use]
extern crate criterion;

extern crate rand;
extern crate rand_xorshift;
extern crate recs;

use criterion::Criterion;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use recs::data::Rating;
use recs::models::factorization;
use recs::models::neighborhood;
use recs::Recommender;

fn synthetic_ratings(num_users: u64, num_items: u64, density: f64) -> Vec<Rating> {
    let mut rng = XorShiftRng::seed_from_u64(42);
    let mut ratings = Vec::new();

    for user in 0..num_users {
        for item in 0..num_items {
            if rng.gen_bool(density) {
                ratings.push(Rating::new(user, item, rng.gen_range(1..6) as f32));
            }
        }
    }

    ratings
}

fn bench_factorization(c: &mut Criterion) {
    c.bench_function("factorization_fit", |b| {
        let ratings = synthetic_ratings(500, 300, 0.1);

        let mut model = factorization::Hyperparameters::new()
            .latent_dim(16)
            .num_epochs(1)
            .seed(42)
            .build()
            .unwrap();

        b.iter(|| {
            model.fit(&ratings).unwrap();
        })
    });
}

fn bench_neighborhood(c: &mut Criterion) {
    c.bench_function("neighborhood_recommend", |b| {
        let ratings = synthetic_ratings(300, 200, 0.1);

        b.iter(|| {
            let mut model = neighborhood::Hyperparameters::new().build().unwrap();
            model.build_model(&ratings, None).unwrap();
            model.recommend(0, None, 10).unwrap();
        })
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_factorization, bench_neighborhood
}
criterion_main!(benches);
