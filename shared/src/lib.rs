use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GRID_SIZE: usize = 64;
pub const MAX_GRID_SIZE: usize = 64;
pub const LAYER_COUNT: usize = 2;
pub const TOKEN_QUERY_PARAM: &str = "token";

/// One of the six named faces of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Face {
    Front,
    Back,
    Top,
    Bottom,
    Left,
    Right,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Front,
        Face::Back,
        Face::Top,
        Face::Bottom,
        Face::Left,
        Face::Right,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Face::Front => "front",
            Face::Back => "back",
            Face::Top => "top",
            Face::Bottom => "bottom",
            Face::Left => "left",
            Face::Right => "right",
        }
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("grid has no rows")]
    Empty,
    #[error("row {row} has {len} cells, expected {expected}")]
    Ragged { row: usize, len: usize, expected: usize },
}

/// Square matrix of blocks, `true` meaning the block is still present.
///
/// Stored row-major in one allocation; on the wire it is an array of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<bool>>", try_from = "Vec<Vec<bool>>")]
pub struct Grid {
    size: usize,
    cells: Vec<bool>,
}

impl Grid {
    pub fn filled(size: usize) -> Self {
        Self {
            size,
            cells: vec![true; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the cell at `(row, col)`, or `None` when out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<bool> {
        if row < self.size && col < self.size {
            Some(self.cells[row * self.size + col])
        } else {
            None
        }
    }

    /// Clears one cell. Returns true only if a block was actually removed.
    pub fn clear_cell(&mut self, row: usize, col: usize) -> bool {
        if row >= self.size || col >= self.size {
            return false;
        }
        let cell = &mut self.cells[row * self.size + col];
        std::mem::replace(cell, false)
    }

    pub fn clear(&mut self) {
        self.cells.iter_mut().for_each(|cell| *cell = false);
    }

    pub fn remaining(&self) -> usize {
        self.cells.iter().filter(|cell| **cell).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|cell| !*cell)
    }

    /// Coordinates of every block still present.
    pub fn present_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let size = self.size;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, present)| **present)
            .map(move |(index, _)| (index / size, index % size))
    }
}

impl From<Grid> for Vec<Vec<bool>> {
    fn from(grid: Grid) -> Self {
        if grid.size == 0 {
            return Vec::new();
        }
        grid.cells.chunks(grid.size).map(<[bool]>::to_vec).collect()
    }
}

impl TryFrom<Vec<Vec<bool>>> for Grid {
    type Error = ShapeError;

    fn try_from(rows: Vec<Vec<bool>>) -> Result<Self, Self::Error> {
        let size = rows.len();
        if size == 0 {
            return Err(ShapeError::Empty);
        }

        let mut cells = Vec::with_capacity(size * size);
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != size {
                return Err(ShapeError::Ragged {
                    row,
                    len: values.len(),
                    expected: size,
                });
            }
            cells.extend(values);
        }

        Ok(Self { size, cells })
    }
}

/// One destructible slice of the cube: six faces and a display color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub front: Grid,
    pub back: Grid,
    pub top: Grid,
    pub bottom: Grid,
    pub left: Grid,
    pub right: Grid,
    pub color: String,
}

impl Layer {
    pub fn new(size: usize, color: String) -> Self {
        Self {
            front: Grid::filled(size),
            back: Grid::filled(size),
            top: Grid::filled(size),
            bottom: Grid::filled(size),
            left: Grid::filled(size),
            right: Grid::filled(size),
            color,
        }
    }

    pub fn face(&self, face: Face) -> &Grid {
        match face {
            Face::Front => &self.front,
            Face::Back => &self.back,
            Face::Top => &self.top,
            Face::Bottom => &self.bottom,
            Face::Left => &self.left,
            Face::Right => &self.right,
        }
    }

    pub fn face_mut(&mut self, face: Face) -> &mut Grid {
        match face {
            Face::Front => &mut self.front,
            Face::Back => &mut self.back,
            Face::Top => &mut self.top,
            Face::Bottom => &mut self.bottom,
            Face::Left => &mut self.left,
            Face::Right => &mut self.right,
        }
    }

    pub fn faces(&self) -> impl Iterator<Item = (Face, &Grid)> {
        Face::ALL.into_iter().map(move |face| (face, self.face(face)))
    }

    pub fn remaining_blocks(&self) -> usize {
        self.faces().map(|(_, grid)| grid.remaining()).sum()
    }

    /// A layer is complete once every cell of every face is gone.
    pub fn is_complete(&self) -> bool {
        self.faces().all(|(_, grid)| grid.is_empty())
    }

    pub fn clear(&mut self) {
        for face in Face::ALL {
            self.face_mut(face).clear();
        }
    }

    /// The shared face dimension, or `None` if the faces disagree.
    pub fn grid_size(&self) -> Option<usize> {
        let size = self.front.size();
        self.faces()
            .all(|(_, grid)| grid.size() == size)
            .then_some(size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown upgrade `{0}`")]
pub struct UnknownUpgrade(pub String);

/// Permanent, purchasable entitlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Upgrade {
    Double,
    DoublePro,
    DoubleMax,
    AutoClicker,
    AutoClickerFast,
    AutoClickerUltra,
    Nuker,
}

impl Upgrade {
    pub const ALL: [Upgrade; 7] = [
        Upgrade::Double,
        Upgrade::DoublePro,
        Upgrade::DoubleMax,
        Upgrade::AutoClicker,
        Upgrade::AutoClickerFast,
        Upgrade::AutoClickerUltra,
        Upgrade::Nuker,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Upgrade::Double => "double",
            Upgrade::DoublePro => "doublePro",
            Upgrade::DoubleMax => "doubleMax",
            Upgrade::AutoClicker => "autoClicker",
            Upgrade::AutoClickerFast => "autoClickerFast",
            Upgrade::AutoClickerUltra => "autoClickerUltra",
            Upgrade::Nuker => "nuker",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Upgrade::Double => "Double Points",
            Upgrade::DoublePro => "Double Points Pro",
            Upgrade::DoubleMax => "Double Points Max",
            Upgrade::AutoClicker => "Auto Clicker",
            Upgrade::AutoClickerFast => "Fast Auto Clicker",
            Upgrade::AutoClickerUltra => "Ultra Auto Clicker",
            Upgrade::Nuker => "Nuker",
        }
    }

    pub fn cost(self) -> u64 {
        match self {
            Upgrade::Double => 50,
            Upgrade::DoublePro => 3_000,
            Upgrade::DoubleMax => 30_000,
            Upgrade::AutoClicker => 100,
            Upgrade::AutoClickerFast => 5_000,
            Upgrade::AutoClickerUltra => 50_000,
            Upgrade::Nuker => 1_000_000,
        }
    }

    /// Each multiplier upgrade contributes an independent x2 factor.
    pub fn is_multiplier(self) -> bool {
        matches!(
            self,
            Upgrade::Double | Upgrade::DoublePro | Upgrade::DoubleMax
        )
    }

    pub fn auto_click_interval(self) -> Option<Duration> {
        match self {
            Upgrade::AutoClicker => Some(Duration::from_millis(1000)),
            Upgrade::AutoClickerFast => Some(Duration::from_millis(250)),
            Upgrade::AutoClickerUltra => Some(Duration::from_millis(50)),
            _ => None,
        }
    }
}

impl fmt::Display for Upgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Upgrade {
    type Err = UnknownUpgrade;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Upgrade::ALL
            .into_iter()
            .find(|upgrade| upgrade.id() == s)
            .ok_or_else(|| UnknownUpgrade(s.to_string()))
    }
}

/// Fastest auto-click cadence among the owned tiers.
pub fn fastest_auto_click(owned: &BTreeSet<Upgrade>) -> Option<Duration> {
    owned
        .iter()
        .filter_map(|upgrade| upgrade.auto_click_interval())
        .min()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub points: u64,
    pub owned_upgrades: BTreeSet<Upgrade>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub username: Option<String>,
    pub points: u64,
}

/// Both visible layers plus the layer counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeSnapshot {
    pub layers: Vec<Layer>,
    pub current_layer: u64,
}

impl CubeSnapshot {
    pub fn active(&self) -> Option<&Layer> {
        self.layers.first()
    }
}

/// Requests a client may send. Identity is never part of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    RemoveBlock { face: Face, row: usize, col: usize },
    UpdatePoints { points: u64 },
    PurchaseUpgrade { upgrade: String },
    NukeLayer,
    RequestLeaderboard,
    UpdateUsername(String),
}

/// Pushes from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    CubeStateUpdate(CubeSnapshot),
    CurrentLayer(u64),
    UserData(UserData),
    LeaderboardUpdate(Vec<LeaderboardEntry>),
    Error { reason: String },
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub fn decode<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_grid_filled() {
        let grid = Grid::filled(3);
        assert_eq!(grid.size(), 3);
        assert_eq!(grid.remaining(), 9);
        assert!(!grid.is_empty());
        assert_eq!(grid.get(2, 2), Some(true));
        assert_eq!(grid.get(3, 0), None);
    }

    #[test]
    fn test_grid_clear_cell_only_once() {
        let mut grid = Grid::filled(2);
        assert!(grid.clear_cell(0, 1));
        assert!(!grid.clear_cell(0, 1));
        assert!(!grid.clear_cell(5, 5));
        assert_eq!(grid.remaining(), 3);
        assert_eq!(grid.get(0, 1), Some(false));
    }

    #[test]
    fn test_grid_present_cells() {
        let mut grid = Grid::filled(2);
        grid.clear_cell(0, 0);
        grid.clear_cell(1, 1);
        let cells: Vec<_> = grid.present_cells().collect();
        assert_eq!(cells, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_grid_wire_shape() {
        let mut grid = Grid::filled(2);
        grid.clear_cell(1, 0);
        let value = serde_json::to_value(&grid).unwrap();
        assert_eq!(value, json!([[true, true], [false, true]]));
    }

    #[test]
    fn test_grid_rejects_ragged_rows() {
        let result: Result<Grid, _> = serde_json::from_value(json!([[true, true], [true]]));
        assert!(result.is_err());

        let result: Result<Grid, _> = serde_json::from_value(json!([]));
        assert!(result.is_err());

        let err = Grid::try_from(vec![vec![true], vec![true, false]]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Ragged {
                row: 0,
                len: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn test_layer_completion() {
        let mut layer = Layer::new(2, "hsl(0, 60%, 50%)".to_string());
        assert_eq!(layer.remaining_blocks(), 24);
        assert!(!layer.is_complete());

        layer.clear();
        assert_eq!(layer.remaining_blocks(), 0);
        assert!(layer.is_complete());
    }

    #[test]
    fn test_layer_face_access() {
        let mut layer = Layer::new(2, "red".to_string());
        layer.face_mut(Face::Left).clear_cell(1, 1);
        assert_eq!(layer.left.get(1, 1), Some(false));
        assert_eq!(layer.face(Face::Right).get(1, 1), Some(true));
        assert_eq!(layer.remaining_blocks(), 23);
    }

    #[test]
    fn test_layer_grid_size_mismatch() {
        let mut layer = Layer::new(2, "red".to_string());
        assert_eq!(layer.grid_size(), Some(2));
        layer.top = Grid::filled(3);
        assert_eq!(layer.grid_size(), None);
    }

    #[test]
    fn test_upgrade_ids_parse() {
        for upgrade in Upgrade::ALL {
            assert_eq!(upgrade.id().parse::<Upgrade>(), Ok(upgrade));
            assert_eq!(
                serde_json::to_value(upgrade).unwrap(),
                json!(upgrade.id())
            );
        }
        assert!("tripleMax".parse::<Upgrade>().is_err());
    }

    #[test]
    fn test_upgrade_costs_increase_with_tier() {
        assert!(Upgrade::Double.cost() < Upgrade::DoublePro.cost());
        assert!(Upgrade::DoublePro.cost() < Upgrade::DoubleMax.cost());
        assert!(Upgrade::AutoClicker.cost() < Upgrade::AutoClickerFast.cost());
        assert!(Upgrade::AutoClickerFast.cost() < Upgrade::AutoClickerUltra.cost());
    }

    #[test]
    fn test_fastest_auto_click_wins() {
        let mut owned = BTreeSet::new();
        assert_eq!(fastest_auto_click(&owned), None);

        owned.insert(Upgrade::Double);
        owned.insert(Upgrade::AutoClicker);
        assert_eq!(fastest_auto_click(&owned), Some(Duration::from_millis(1000)));

        owned.insert(Upgrade::AutoClickerUltra);
        assert_eq!(fastest_auto_click(&owned), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_client_message_wire_format() {
        let message: ClientMessage =
            decode(r#"{"event":"removeBlock","data":{"face":"top","row":1,"col":0}}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::RemoveBlock {
                face: Face::Top,
                row: 1,
                col: 0
            }
        );

        let message: ClientMessage = decode(r#"{"event":"nukeLayer"}"#).unwrap();
        assert_eq!(message, ClientMessage::NukeLayer);

        let message: ClientMessage =
            decode(r#"{"event":"updateUsername","data":"voxelfan"}"#).unwrap();
        assert_eq!(message, ClientMessage::UpdateUsername("voxelfan".to_string()));
    }

    #[test]
    fn test_client_message_rejects_bad_shapes() {
        assert!(decode::<ClientMessage>(r#"{"event":"removeBlock","data":{"face":"inside","row":0,"col":0}}"#).is_err());
        assert!(decode::<ClientMessage>(r#"{"event":"updatePoints","data":{"points":-5}}"#).is_err());
        assert!(decode::<ClientMessage>(r#"{"event":"dropTable"}"#).is_err());
        assert!(decode::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_wire_format() {
        let mut owned = BTreeSet::new();
        owned.insert(Upgrade::DoublePro);
        let message = ServerMessage::UserData(UserData {
            points: 10,
            owned_upgrades: owned,
        });

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"event": "userData", "data": {"points": 10, "ownedUpgrades": ["doublePro"]}})
        );

        let value = serde_json::to_value(ServerMessage::CurrentLayer(7)).unwrap();
        assert_eq!(value, json!({"event": "currentLayer", "data": 7}));
    }

    #[test]
    fn test_cube_snapshot_wire_format() {
        let snapshot = CubeSnapshot {
            layers: vec![Layer::new(1, "a".to_string()), Layer::new(1, "b".to_string())],
            current_layer: 3,
        };
        let value = serde_json::to_value(ServerMessage::CubeStateUpdate(snapshot)).unwrap();
        assert_eq!(value["event"], json!("cubeStateUpdate"));
        assert_eq!(value["data"]["currentLayer"], json!(3));
        assert_eq!(value["data"]["layers"][1]["color"], json!("b"));
        assert_eq!(value["data"]["layers"][0]["front"], json!([[true]]));
    }
}
