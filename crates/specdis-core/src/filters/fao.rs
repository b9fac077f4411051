//! FAO-area filter: 1.0 at every cell whose FAO statistical-area id is in
//! the taxon's membership set, no opinion elsewhere.

use crate::errors::Result;
use crate::matrix::ProbabilityMatrix;
use crate::taxon::Taxon;
use crate::world::{field, WorldGrid};

pub fn filter(taxon: &Taxon, world: &WorldGrid) -> Result<ProbabilityMatrix> {
    let mut matrix = ProbabilityMatrix::world();
    if taxon.fao_areas.is_empty() {
        return Ok(matrix);
    }

    let fao = world.field(field::FAO_AREA)?;
    for row in 0..matrix.rows() {
        for col in 0..matrix.cols() {
            let id = fao.get(row, col);
            if id >= 0.0 && taxon.fao_areas.contains(&(id as u16)) {
                matrix.define(row, col, 1.0);
            }
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{taxon_for_tests, world_for_tests, WorldSpec};
    use std::collections::BTreeSet;

    #[test]
    fn cells_in_member_areas_are_one() {
        // Test world: FAO id 27 in the northern half, 47 in the southern.
        let world = world_for_tests(&WorldSpec::default());
        let mut taxon = taxon_for_tests();
        taxon.fao_areas = BTreeSet::from([27]);

        let m = filter(&taxon, &world).unwrap();
        assert_eq!(m.get(0, 0), Some(1.0));
        assert_eq!(m.get(359, 0), None);
        assert_eq!(m.count_defined(), 180 * 720);
    }

    #[test]
    fn empty_membership_set_is_fully_masked() {
        let world = world_for_tests(&WorldSpec::default());
        let mut taxon = taxon_for_tests();
        taxon.fao_areas = BTreeSet::new();

        let m = filter(&taxon, &world).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn multiple_member_areas_are_unioned() {
        let world = world_for_tests(&WorldSpec::default());
        let mut taxon = taxon_for_tests();
        taxon.fao_areas = BTreeSet::from([27, 47]);

        let m = filter(&taxon, &world).unwrap();
        assert_eq!(m.count_defined(), 360 * 720);
    }
}
