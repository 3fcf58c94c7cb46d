use nalgebra::{DMatrix, DVector};
use spline_mvar::Multivar;
use tracing::{debug, instrument};

use crate::error::ZeroError;
use crate::types::{Constraint, ConstraintKind, Solution, ZeroConfig};

/// Solve a system of scalar constraints over a shared parameter box.
///
/// Zero constraints must vanish, sign constraints bound the feasible region.
/// The solver recursively subdivides the box, pruning cells where a
/// constraint's control coefficients prove it infeasible, and polishes
/// isolated candidates with Newton iterations when the zero system is
/// square.
pub fn solve(constraints: &[Constraint], config: &ZeroConfig) -> Result<Vec<Solution>, ZeroError> {
    solve_with_veto(constraints, config, None)
}

/// [`solve`] with an optional cell veto.
///
/// The veto sees each candidate cell's per-axis domains (in the original
/// problem coordinates) before a solution is emitted; returning `true`
/// discards the cell. Callers use it to reject already-known regions or to
/// impose domain restrictions the constraints cannot express.
#[instrument(skip_all, fields(constraints = constraints.len()))]
pub fn solve_with_veto(
    constraints: &[Constraint],
    config: &ZeroConfig,
    veto: Option<&dyn Fn(&[(f64, f64)]) -> bool>,
) -> Result<Vec<Solution>, ZeroError> {
    if constraints.is_empty() {
        return Err(ZeroError::EmptyConstraints);
    }

    // Normalize every constraint to a scalar non-rational b-spline.
    let mut mvs = Vec::with_capacity(constraints.len());
    let mut kinds = Vec::with_capacity(constraints.len());
    for (index, c) in constraints.iter().enumerate() {
        if !c.mvar.is_scalar() {
            return Err(ZeroError::NotScalar { index });
        }
        let mv = c.mvar.float_periodic()?.to_bspline()?;
        mvs.push(mv);
        kinds.push(c.kind);
    }
    let dim = mvs[0].dim();
    for mv in &mvs[1..] {
        if mv.dim() != dim {
            return Err(ZeroError::DimMismatch {
                expected: dim,
                found: mv.dim(),
            });
        }
    }
    for axis in 0..dim {
        let (min0, max0) = mvs[0].domain(axis)?;
        let span = (max0 - min0).abs().max(1.0);
        for mv in &mvs[1..] {
            let (min, max) = mv.domain(axis)?;
            if (min - min0).abs() > 1e-9 * span || (max - max0).abs() > 1e-9 * span {
                return Err(ZeroError::DomainMismatch { axis });
            }
        }
    }

    let zero_idx: Vec<usize> = kinds
        .iter()
        .enumerate()
        .filter(|(_, k)| **k == ConstraintKind::Zero)
        .map(|(i, _)| i)
        .collect();

    // Newton needs a square system and differentiable constraints; fall back
    // to plain midpoint candidates when either is missing.
    let derivs = if config.newton_refine && zero_idx.len() == dim {
        let mut rows = Vec::with_capacity(zero_idx.len());
        let mut ok = true;
        'build: for &ci in &zero_idx {
            let mut row = Vec::with_capacity(dim);
            for axis in 0..dim {
                match mvs[ci].derivative(axis) {
                    Ok(d) => row.push(d),
                    Err(_) => {
                        ok = false;
                        break 'build;
                    }
                }
            }
            rows.push(row);
        }
        if ok {
            Some(rows)
        } else {
            None
        }
    } else {
        None
    };

    let mut domain_box = Vec::with_capacity(dim);
    for axis in 0..dim {
        domain_box.push(mvs[0].domain(axis)?);
    }

    let ctx = Ctx {
        kinds: &kinds,
        top: &mvs,
        derivs: derivs.as_deref(),
        zero_idx: &zero_idx,
        domain_box: &domain_box,
        config,
        veto,
    };

    let mut raw = Vec::new();
    recurse(&ctx, &mvs, 0, &mut raw)?;
    let merged = dedup(raw, config.subdiv_tol);
    debug!(solutions = merged.len(), "zero-set search finished");
    Ok(merged)
}

struct Ctx<'a> {
    kinds: &'a [ConstraintKind],
    top: &'a [Multivar],
    derivs: Option<&'a [Vec<Multivar>]>,
    zero_idx: &'a [usize],
    domain_box: &'a [(f64, f64)],
    config: &'a ZeroConfig,
    veto: Option<&'a dyn Fn(&[(f64, f64)]) -> bool>,
}

fn coeff_range(mv: &Multivar) -> (f64, f64) {
    mv.points()
        .raw_channel(0)
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn recurse(
    ctx: &Ctx<'_>,
    mvs: &[Multivar],
    depth: u32,
    out: &mut Vec<Solution>,
) -> Result<(), ZeroError> {
    let tol = ctx.config.numeric_tol;

    // Convex-hull pruning: control coefficients bound the function, so a
    // one-signed coefficient range settles the cell.
    for (mv, kind) in mvs.iter().zip(ctx.kinds) {
        let (lo, hi) = coeff_range(mv);
        let infeasible = match kind {
            ConstraintKind::Zero => lo > tol || hi < -tol,
            ConstraintKind::Negative => lo > tol,
            ConstraintKind::Positive => hi < -tol,
        };
        if infeasible {
            return Ok(());
        }
    }

    let dim = mvs[0].dim();
    let mut cell = Vec::with_capacity(dim);
    for axis in 0..dim {
        cell.push(mvs[0].aux_domain(axis)?);
    }
    let widest = cell
        .iter()
        .map(|(a, b)| b - a)
        .fold(0.0_f64, f64::max);

    let capped = depth >= ctx.config.max_depth;
    if widest <= ctx.config.subdiv_tol || capped {
        emit_candidate(ctx, &cell, capped && widest > ctx.config.subdiv_tol, out);
        return Ok(());
    }

    let axis = (0..dim)
        .max_by(|&a, &b| {
            let sa = cell[a].1 - cell[a].0;
            let sb = cell[b].1 - cell[b].0;
            sa.partial_cmp(&sb).expect("spans are finite")
        })
        .expect("at least one axis");
    let (dmin, dmax) = mvs[0].domain(axis)?;
    let t = 0.5 * (dmin + dmax);

    let mut lefts = Vec::with_capacity(mvs.len());
    let mut rights = Vec::with_capacity(mvs.len());
    for mv in mvs {
        let (l, r) = mv.subdivide(axis, t)?;
        lefts.push(l);
        rights.push(r);
    }
    recurse(ctx, &lefts, depth + 1, out)?;
    recurse(ctx, &rights, depth + 1, out)
}

fn emit_candidate(
    ctx: &Ctx<'_>,
    cell: &[(f64, f64)],
    depth_capped: bool,
    out: &mut Vec<Solution>,
) {
    if let Some(veto) = ctx.veto {
        if veto(cell) {
            return;
        }
    }
    let midpoint: Vec<f64> = cell.iter().map(|(a, b)| 0.5 * (a + b)).collect();

    let (params, method) = match newton_polish(ctx, &midpoint) {
        Some(p) => (p, "newton"),
        None => (midpoint, "subdivision"),
    };

    // Sign constraints are re-checked at the final point; Newton may have
    // moved it across a boundary the subdivision respected.
    for (mv, kind) in ctx.top.iter().zip(ctx.kinds) {
        let v = match mv.eval(&params) {
            Ok(v) => v[0],
            Err(_) => return,
        };
        let keep = match kind {
            ConstraintKind::Zero => true,
            ConstraintKind::Negative => v <= ctx.config.numeric_tol.max(1e-9),
            ConstraintKind::Positive => v >= -ctx.config.numeric_tol.max(1e-9),
        };
        if !keep {
            return;
        }
    }

    let mut attrs = vec![("method".to_string(), method.to_string())];
    if depth_capped {
        attrs.push(("depth-capped".to_string(), "true".to_string()));
    }
    out.push(Solution { params, attrs });
}

fn newton_polish(ctx: &Ctx<'_>, start: &[f64]) -> Option<Vec<f64>> {
    let derivs = ctx.derivs?;
    let dim = start.len();
    let tol = ctx.config.numeric_tol;
    let mut x = start.to_vec();

    for _ in 0..24 {
        let mut f = DVector::zeros(dim);
        for (r, &ci) in ctx.zero_idx.iter().enumerate() {
            f[r] = ctx.top[ci].eval(&x).ok()?[0];
        }
        if f.amax() < tol {
            return Some(x);
        }
        let mut j = DMatrix::zeros(dim, dim);
        for (r, row) in derivs.iter().enumerate() {
            for (c, d) in row.iter().enumerate() {
                j[(r, c)] = d.eval(&x).ok()?[0];
            }
        }
        let step = j.lu().solve(&(-f))?;
        for (axis, xi) in x.iter_mut().enumerate() {
            let (lo, hi) = ctx.domain_box[axis];
            *xi = (*xi + step[axis]).clamp(lo, hi);
        }
    }

    // Accept only if the residual actually converged.
    let mut worst = 0.0_f64;
    for &ci in ctx.zero_idx {
        worst = worst.max(ctx.top[ci].eval(&x).ok()?[0].abs());
    }
    (worst < tol.max(1e-8)).then_some(x)
}

fn dedup(solutions: Vec<Solution>, tol: f64) -> Vec<Solution> {
    let mut kept: Vec<Solution> = Vec::new();
    for s in solutions {
        match kept.iter_mut().find(|k| {
            k.params
                .iter()
                .zip(&s.params)
                .all(|(a, b)| (a - b).abs() < tol)
        }) {
            Some(existing) => {
                // Prefer a polished point over a raw cell midpoint.
                if existing.attr("method") == Some("subdivision")
                    && s.attr("method") == Some("newton")
                {
                    *existing = s;
                }
            }
            None => kept.push(s),
        }
    }
    kept
}
