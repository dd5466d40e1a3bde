pub mod movie;
pub mod reservation;
pub mod showtime;
pub mod user;

pub use movie::{Movie, MovieFilter, MovieInput};
pub use reservation::{
    MovieReservationCount, MovieSeatTotal, NewReservation, Reservation, ReservationRequest,
    RevenueReport,
};
pub use showtime::{Showtime, ShowtimeInput};
pub use user::{Credentials, NewUser, User};
