//! Discovery of annotated globals.
//!
//! The front end carries variable annotations in the conventional
//! `module.annotations` array; each entry is a struct whose first field
//! points at the annotated value and whose second field points at the tag's
//! string data. Front ends differ on whether the first field is a bitcast of
//! the global or the global's address directly, so both forms resolve.

use polymask_ir::{Const, ConstId, GlobalId, Module};

/// One decoded entry of the annotations array.
#[derive(Clone, Copy, Debug)]
pub struct AnnotationEntry {
    /// The entry struct itself, reused verbatim when the entry is preserved.
    pub entry: ConstId,
    /// The annotated global, when the entry points at one.
    pub target: Option<GlobalId>,
    /// The tag, when the entry's string resolves.
    pub tag: Option<ConstId>,
}

/// Decodes the annotations array, in entry order. Missing array or odd
/// entries are not errors; undecodable entries simply carry `None` fields
/// and end up preserved.
pub fn read_annotations(module: &Module) -> Vec<AnnotationEntry> {
    module
        .annotation_entries()
        .into_iter()
        .map(|entry| {
            let (target, tag) = match module.get_const(entry) {
                Const::Struct(fields) if fields.len() >= 2 => (
                    resolve_global(module, fields[0]),
                    resolve_tag(module, fields[1]),
                ),
                _ => (None, None),
            };
            AnnotationEntry { entry, target, tag }
        })
        .collect()
}

/// The tag string of an entry, when it resolves.
pub fn tag_text(module: &Module, tag: ConstId) -> Option<&str> {
    match module.get_const(tag) {
        Const::Str(s) => Some(s),
        _ => None,
    }
}

/// Peels a bitcast, if any, and resolves a global reference.
fn resolve_global(module: &Module, field: ConstId) -> Option<GlobalId> {
    let field = peel_bitcast(module, field);
    match module.get_const(field) {
        Const::GlobalRef(gid) => Some(*gid),
        _ => None,
    }
}

/// Resolves the tag pointer to the string data it names.
fn resolve_tag(module: &Module, field: ConstId) -> Option<ConstId> {
    let mut field = peel_bitcast(module, field);
    if let Const::Gep { base, indices } = module.get_const(field) {
        if *indices != [0, 0] {
            return None;
        }
        field = peel_bitcast(module, *base);
    }
    match module.get_const(field) {
        Const::GlobalRef(gid) => {
            let init = module.try_global(*gid)?.init?;
            matches!(module.get_const(init), Const::Str(_)).then_some(init)
        }
        _ => None,
    }
}

fn peel_bitcast(module: &Module, c: ConstId) -> ConstId {
    match module.get_const(c) {
        Const::Bitcast { value, .. } => *value,
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use polymask_ir::{Linkage, Ty};

    use super::*;

    #[test]
    fn decodes_builder_entries() {
        let mut m = Module::new("t");
        let data = m.const_data_array(vec![1, 2, 3]);
        let table = m.add_global("T", Ty::I32.array_of(3), true, Linkage::Private, Some(data));
        m.annotate_global(table, "interpolate");

        let entries = read_annotations(&m);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, Some(table));
        let tag = entries[0].tag.expect("tag resolves");
        assert_eq!(tag_text(&m, tag), Some("interpolate"));
    }

    #[test]
    fn decodes_direct_pointer_entries() {
        // Some front ends skip the bitcast when types already line up.
        let mut m = Module::new("t");
        let data = m.const_data_array(vec![4]);
        let table = m.add_global("T", Ty::I32.array_of(1), true, Linkage::Private, Some(data));
        let tag_data = m.const_str("interpolate");
        let tag_global = m.add_global(
            "anno.interpolate",
            Ty::I8.array_of(12),
            true,
            Linkage::Private,
            Some(tag_data),
        );
        let table_ref = m.global_ref(table);
        let tag_ref = m.global_ref(tag_global);
        let tag_ptr = m.const_gep(tag_ref, vec![0, 0]);
        let entry = m.const_struct(vec![table_ref, tag_ptr]);
        let entry_ty = m.const_ty(entry);
        let array_ty = entry_ty.clone().array_of(1);
        let array = m.const_array(entry_ty, vec![entry]);
        m.add_global(
            polymask_ir::GLOBAL_ANNOTATIONS,
            array_ty,
            false,
            Linkage::External,
            Some(array),
        );

        let entries = read_annotations(&m);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].target, Some(table));
        assert_eq!(tag_text(&m, entries[0].tag.unwrap()), Some("interpolate"));
    }

    #[test]
    fn missing_array_is_empty() {
        let m = Module::new("t");
        assert!(read_annotations(&m).is_empty());
    }
}
