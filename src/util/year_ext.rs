use std::collections::BTreeSet;

/// Calendar year of a dated record.
pub trait GetYear {
    fn get_year(&self) -> i32;
}

pub trait YearsExt {
    /// All distinct years present, in ascending order.
    fn years(&self) -> BTreeSet<i32>;
}

/// Blanket implementation for every slice whose items implement `GetYear`.
impl<T> YearsExt for [T]
where
    T: GetYear,
{
    fn years(&self) -> BTreeSet<i32> {
        self.iter().map(|item| item.get_year()).collect()
    }
}
