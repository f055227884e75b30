//! The module transformation entry point.

use anyhow::{Context, Result};
use log::{debug, warn};
use polymask_field::interpolation::interpolant_with_options;
use polymask_ir::{verify_module, ConstId, GlobalId, Module, GLOBAL_ANNOTATIONS};

use crate::annotations::{read_annotations, tag_text};
use crate::config::PassConfig;
use crate::eligibility::{extract_points, plan_rewrite, table_shape};
use crate::rewrite::apply_rewrite;
use crate::synthesis::build_poly_fn;

/// Runs the pass with the standard configuration. Returns whether the module
/// changed, so the surrounding pipeline can invalidate downstream analyses.
pub fn transform_module(module: &mut Module) -> Result<bool> {
    transform_module_with_config(module, &PassConfig::standard())
}

/// Runs the pass. Every tagged, valid, fully-rewritable table is absorbed;
/// everything else is preserved untouched. The result is always verified: a
/// failure there is a bug in this pass, not in the input.
pub fn transform_module_with_config(module: &mut Module, config: &PassConfig) -> Result<bool> {
    let mut changed = false;
    let entries = read_annotations(module);
    if !entries.is_empty() {
        let mut preserved: Vec<ConstId> = Vec::new();
        let mut absorbed: Vec<GlobalId> = Vec::new();
        for entry in entries {
            let tagged = entry
                .tag
                .and_then(|t| tag_text(module, t))
                .is_some_and(|t| t == config.annotation);
            match entry.target {
                // A duplicate tag on an absorbed table dies with it.
                Some(gid) if tagged && absorbed.contains(&gid) => {}
                Some(gid) if tagged => {
                    if absorb_table(module, gid, config) {
                        absorbed.push(gid);
                        changed = true;
                    } else {
                        preserved.push(entry.entry);
                    }
                }
                _ => preserved.push(entry.entry),
            }
        }

        rebuild_annotations(module, preserved);
        for gid in absorbed {
            module.erase_global(gid);
        }
    }

    verify_module(module).context("invalid module after table interpolation")?;
    Ok(changed)
}

/// Interpolates one candidate and splices the evaluator in, or reports why
/// the candidate is kept.
fn absorb_table(module: &mut Module, gid: GlobalId, config: &PassConfig) -> bool {
    let name = module.global(gid).name.clone();
    if !table_shape(module, gid) {
        warn!("skipping {name}, reason: Wrong type for interpolation.");
        return false;
    }
    let Some(plan) = plan_rewrite(module, gid) else {
        warn!("skipping {name}, reason: Not rewritable.");
        return false;
    };

    let points = extract_points(module, gid);
    let (poly, modulus) =
        interpolant_with_options(&points, config.modulus_headroom, config.primality_rounds);
    debug!("{name}: mod {modulus} polynomial {poly}");

    let poly_fn = build_poly_fn(module, &name, &poly, modulus);
    apply_rewrite(module, &plan, poly_fn);
    true
}

/// Reinstalls the annotations array with only the preserved entries, or
/// erases the variable outright when none survive.
fn rebuild_annotations(module: &mut Module, preserved: Vec<ConstId>) {
    let Some(gid) = module.global_by_name(GLOBAL_ANNOTATIONS) else {
        return;
    };
    if preserved.is_empty() {
        module.erase_global(gid);
        return;
    }
    let entry_ty = module.const_ty(preserved[0]);
    let array_ty = entry_ty.clone().array_of(preserved.len());
    let array = module.const_array(entry_ty, preserved);
    let global = module.global_mut(gid);
    global.ty = array_ty;
    global.init = Some(array);
}
