use std::sync::OnceLock;

/// Orders below this bound are served from the cached Pascal triangle.
const CACHE_ROWS: usize = 30;

static PASCAL: OnceLock<Vec<Vec<f64>>> = OnceLock::new();

fn pascal() -> &'static Vec<Vec<f64>> {
    PASCAL.get_or_init(|| {
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(CACHE_ROWS);
        for n in 0..CACHE_ROWS {
            let mut row = vec![1.0; n + 1];
            for k in 1..n {
                row[k] = rows[n - 1][k - 1] + rows[n - 1][k];
            }
            rows.push(row);
        }
        rows
    })
}

/// Binomial coefficient `C(n, k)` as an exactly-representable `f64`.
///
/// Values with `n` below the cache bound come from a shared Pascal triangle;
/// larger arguments fall back to the direct product form, which stays exact
/// for the orders used by degree arithmetic (well below 2^53).
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    if n < CACHE_ROWS {
        return pascal()[n][k];
    }
    let k = k.min(n - k);
    let mut r = 1.0;
    for i in 1..=k {
        r = r * (n - k + i) as f64 / i as f64;
    }
    r
}

/// Bernstein product blending coefficient
/// `C(deg_a, i) * C(deg_b, j) / C(deg_a + deg_b, i + j)`,
/// the weight with which coefficient pair `(i, j)` contributes to index
/// `i + j` of a Bezier product.
pub fn bernstein_product_coef(deg_a: usize, i: usize, deg_b: usize, j: usize) -> f64 {
    binomial(deg_a, i) * binomial(deg_b, j) / binomial(deg_a + deg_b, i + j)
}
