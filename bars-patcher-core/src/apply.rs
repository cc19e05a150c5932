use crate::locate::PatchSite;

/// Copy `header` over the container at `offset`. Returns `false` and leaves
/// the container untouched if the header would run past the end.
pub fn write_header(container: &mut [u8], offset: usize, header: &[u8]) -> bool {
    let Some(end) = offset.checked_add(header.len()) else {
        return false;
    };
    match container.get_mut(offset..end) {
        Some(dst) => {
            dst.copy_from_slice(header);
            true
        }
        None => false,
    }
}

/// Write `header` at every applicable site and return how many were
/// written. Sites without room are left alone.
pub fn apply_sites(container: &mut [u8], header: &[u8], sites: &[PatchSite]) -> usize {
    sites
        .iter()
        .filter_map(PatchSite::applicable_offset)
        .filter(|&offset| write_header(container, offset, header))
        .count()
}
